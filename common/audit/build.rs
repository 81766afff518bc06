//! Compiles `proto/message.proto` into the wire types and the embedded descriptor set.
//!
//! The proto is parsed with protox, so no `protoc` binary is needed on the build host.

use prost::Message;
use std::{env, fs, path::PathBuf};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/message.proto");

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let descriptors = protox::compile(["message.proto"], ["proto"])?;
    fs::write(out_dir.join("message_descriptor.bin"), descriptors.encode_to_vec())?;

    prost_build::Config::new()
        .message_attribute(".message", "#[derive(serde::Serialize)]")
        .enum_attribute(".message", "#[derive(serde::Serialize, serde::Deserialize)]")
        .enum_attribute(".message", "#[serde(rename_all = \"UPPERCASE\")]")
        .field_attribute(
            ".message.Request.id",
            "#[serde(skip_serializing_if = \"Option::is_none\")]",
        )
        .compile_fds(descriptors)?;

    Ok(())
}
