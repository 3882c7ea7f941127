pub mod batch;
mod cipher;
mod container;
mod decoder;
pub mod discovery;
pub mod error;
mod key;
mod metadata;
#[cfg(test)]
mod test_support;

pub use decoder::{AudioFormat, NcmFile};
pub use error::{MetadataError, NcmError, Result};
pub use metadata::NcmMetadata;

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Decode an NCM file to MP3/FLAC.
///
/// The audio is written to `output` when given, otherwise next to the input
/// with its extension replaced by the recovered format (`mp3` by default).
/// Returns the path written.
pub fn decode(input: &Path, output: Option<&Path>) -> Result<PathBuf> {
    decode_to(
        input,
        |format| match output {
            Some(path) => path.to_path_buf(),
            None => input.with_extension(format.extension()),
        },
        |_| Ok(()),
    )
}

/// Convert an NCM file to a standard audio file (MP3/FLAC).
///
/// The output is `<output_dir>/<input stem>.<ext>`, where `output_dir`
/// defaults to the input's directory. Returns the path to the output file.
pub fn convert(input: &Path, output_dir: Option<&Path>) -> Result<PathBuf> {
    convert_claiming(input, output_dir, |_| Ok(()))
}

/// [`convert`], asking `claim` for the output path before anything is written.
/// An error from `claim` fails the conversion.
pub(crate) fn convert_claiming(
    input: &Path,
    output_dir: Option<&Path>,
    claim: impl FnOnce(&Path) -> Result<()>,
) -> Result<PathBuf> {
    decode_to(
        input,
        |format| {
            let out_dir = output_dir.unwrap_or_else(|| input.parent().unwrap_or(Path::new(".")));
            let mut name = input.file_stem().unwrap_or_default().to_os_string();
            name.push(".");
            name.push(format.extension());
            out_dir.join(name)
        },
        claim,
    )
}

fn decode_to(
    input: &Path,
    output_for: impl FnOnce(AudioFormat) -> PathBuf,
    claim: impl FnOnce(&Path) -> Result<()>,
) -> Result<PathBuf> {
    let ncm = {
        let mut reader = BufReader::new(File::open(input)?);
        NcmFile::parse(&mut reader)?
    };

    let output_path = output_for(ncm.format);
    if output_path == input {
        return Err(NcmError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("output would overwrite the source file {}", input.display()),
        )));
    }
    claim(&output_path)?;

    let audio = ncm.into_audio();
    write_atomic(&output_path, &audio)?;
    debug!(
        input = %input.display(),
        output = %output_path.display(),
        bytes = audio.len(),
        "decoded"
    );
    Ok(output_path)
}

/// Write through a temp file in the destination directory so a failed write
/// never leaves a partial file at `path`.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Same mode `File::create` asks for, so the umask decides the result.
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder.tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
