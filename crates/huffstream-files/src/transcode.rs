//! Encode and decode whole files.

use crate::error::{FileError, Result};
use huffstream_codec::CompressionStats;
use std::path::Path;

/// Compress `input` into a container at `output`
///
/// # Errors
/// `Io` if either file fails
pub async fn encode_file(input: &Path, output: &Path) -> Result<CompressionStats> {
    let data = tokio::fs::read(input)
        .await
        .map_err(|e| FileError::io(input, e))?;
    let (container, stats) = huffstream_codec::compress_with_stats(&data)?;
    write_file(output, &container).await?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        original = stats.original_size,
        container = stats.container_size,
        "encoded file"
    );
    Ok(stats)
}

/// Reconstruct the original bytes of the container at `input` into `output`
///
/// Nothing is written unless the container decodes and verifies.
///
/// # Errors
/// `Io` if either file fails, `Codec` if the container is malformed or
/// corrupt
pub async fn decode_file(input: &Path, output: &Path) -> Result<u64> {
    let container = tokio::fs::read(input)
        .await
        .map_err(|e| FileError::io(input, e))?;
    let data = huffstream_codec::decompress(&container)?;
    write_file(output, &data).await?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        bytes = data.len(),
        "decoded file"
    );
    Ok(data.len() as u64)
}

/// Write `bytes` to `path`, creating missing parent directories
pub(crate) async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FileError::io(parent, e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| FileError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use huffstream_codec::CodecError;

    #[tokio::test]
    async fn test_encode_decode_file() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("report.txt");
        let encoded = dir.path().join("out/report_encoded.txt");
        let decoded = dir.path().join("report_decoded.txt");

        let text = b"the quick brown fox jumps over the lazy dog, twice: the quick brown fox";
        tokio::fs::write(&original, text).await.unwrap();

        let stats = encode_file(&original, &encoded).await.unwrap();
        assert_eq!(stats.original_size, text.len() as u64);
        assert_eq!(
            stats.container_size,
            tokio::fs::metadata(&encoded).await.unwrap().len()
        );

        let written = decode_file(&encoded, &decoded).await.unwrap();
        assert_eq!(written, text.len() as u64);
        assert_eq!(tokio::fs::read(&decoded).await.unwrap(), text);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("empty");
        let encoded = dir.path().join("empty_encoded");
        let decoded = dir.path().join("empty_decoded");
        tokio::fs::write(&original, b"").await.unwrap();

        encode_file(&original, &encoded).await.unwrap();
        assert_eq!(decode_file(&encoded, &decoded).await.unwrap(), 0);
        assert!(tokio::fs::read(&decoded).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let err = encode_file(&missing, &dir.path().join("x"))
            .await
            .unwrap_err();
        match err {
            FileError::Io { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_decode_garbage_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.huff");
        let output = dir.path().join("garbage_decoded");
        tokio::fs::write(&garbage, b"not a container").await.unwrap();

        let err = decode_file(&garbage, &output).await.unwrap_err();
        assert!(matches!(err, FileError::Codec(CodecError::MalformedContainer(_))));
        assert!(!output.exists());
    }
}
