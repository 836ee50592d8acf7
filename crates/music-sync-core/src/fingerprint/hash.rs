use regex::Regex;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::OnceLock;

const READ_CHUNK: usize = 8192;

/// MD5 of the whole file as lowercase hex, streamed in 8 KiB chunks.
pub fn hash_file_md5(file: &Path) -> io::Result<String> {
    let mut f = File::open(file)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let bytes_read = f.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        context.consume(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", context.compute()))
}

fn md5_token_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"MD5=([a-f0-9]{32})").ok())
        .as_ref()
}

/// First `MD5=<32 lowercase hex>` token in decoder output.
pub fn parse_md5_token(output: &str) -> Option<String> {
    md5_token_regex()?
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
