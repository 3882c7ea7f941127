//! Converting many files at once.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;
use tracing::debug;

use crate::error::NcmError;

#[derive(Debug)]
pub enum BatchEvent<'a> {
    Started {
        input: &'a Path,
    },
    Converted {
        input: &'a Path,
        output: &'a Path,
    },
    Failed {
        input: &'a Path,
        error: &'a NcmError,
    },
}

/// Counters at the moment an event was emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub done: usize,
    pub total: usize,
    pub converted: usize,
    pub failed: usize,
}

impl BatchProgress {
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.done as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// `(input, output)` pairs, in input order.
    pub converted: Vec<(PathBuf, PathBuf)>,
    /// `(input, error)` pairs, in input order.
    pub failed: Vec<(PathBuf, NcmError)>,
}

/// Convert every file with [`crate::convert`] on the rayon pool.
///
/// `on_event` is called from worker threads. A failed file is reported and
/// the rest of the batch carries on.
///
/// Each output path is written at most once per batch. When two inputs map to
/// the same output (same stem, same output directory), whichever reaches it
/// second fails with an `AlreadyExists` I/O error.
pub fn convert_all<F>(files: &[PathBuf], output_dir: Option<&Path>, on_event: F) -> BatchReport
where
    F: Fn(&BatchEvent<'_>, BatchProgress) + Sync,
{
    let progress = Mutex::new(BatchProgress {
        total: files.len(),
        ..BatchProgress::default()
    });

    let claimed = Mutex::new(HashSet::new());

    let results: Vec<_> = files
        .par_iter()
        .map(|input| {
            on_event(&BatchEvent::Started { input }, update(&progress, |_| {}));
            let result =
                crate::convert_claiming(input, output_dir, |output| claim(&claimed, output));
            match &result {
                Ok(output) => {
                    debug!("{} -> {}", input.display(), output.display());
                    let p = update(&progress, |p| {
                        p.done += 1;
                        p.converted += 1;
                    });
                    on_event(&BatchEvent::Converted { input, output }, p);
                }
                Err(error) => {
                    debug!("{} failed: {error}", input.display());
                    let p = update(&progress, |p| {
                        p.done += 1;
                        p.failed += 1;
                    });
                    on_event(&BatchEvent::Failed { input, error }, p);
                }
            }
            result
        })
        .collect();

    let mut report = BatchReport::default();
    for (input, result) in files.iter().zip(results) {
        match result {
            Ok(output) => report.converted.push((input.clone(), output)),
            Err(error) => report.failed.push((input.clone(), error)),
        }
    }
    report
}

fn claim(claimed: &Mutex<HashSet<PathBuf>>, output: &Path) -> crate::Result<()> {
    let mut claimed = claimed.lock().unwrap_or_else(PoisonError::into_inner);
    if claimed.insert(output.to_path_buf()) {
        Ok(())
    } else {
        Err(NcmError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} is already produced by another file in this batch", output.display()),
        )))
    }
}

fn update(
    progress: &Mutex<BatchProgress>,
    f: impl FnOnce(&mut BatchProgress),
) -> BatchProgress {
    let mut p = progress.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut *p);
    *p
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::{container_bytes, encrypt_payload, key_blob};

    #[test]
    fn test_batch_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let key = b"batch-key";
        let good_a = dir.path().join("a.ncm");
        let bad = dir.path().join("bad.ncm");
        let good_b = dir.path().join("b.ncm");
        fs::write(
            &good_a,
            container_bytes(&key_blob(key), b"", b"", &encrypt_payload(key, b"AAAA")),
        )
        .unwrap();
        fs::write(&bad, b"BADMAGIC and then some").unwrap();
        fs::write(
            &good_b,
            container_bytes(&key_blob(key), b"", b"", &encrypt_payload(key, b"BBBBBB")),
        )
        .unwrap();

        let out_dir = dir.path().join("out");
        fs::create_dir(&out_dir).unwrap();
        let files = vec![good_a.clone(), bad.clone(), good_b.clone()];
        let events = Mutex::new(Vec::new());
        let report = convert_all(&files, Some(&out_dir), |event, p| {
            let kind = match event {
                BatchEvent::Started { .. } => "started",
                BatchEvent::Converted { .. } => "converted",
                BatchEvent::Failed { .. } => "failed",
            };
            events.lock().unwrap().push((kind, p));
        });

        assert_eq!(
            report.converted,
            [
                (good_a, out_dir.join("a.mp3")),
                (good_b, out_dir.join("b.mp3")),
            ]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, bad);
        assert!(matches!(report.failed[0].1, NcmError::InvalidFormat(_)));
        assert_eq!(fs::read(out_dir.join("a.mp3")).unwrap(), b"AAAA");
        assert_eq!(fs::read(out_dir.join("b.mp3")).unwrap(), b"BBBBBB");
        assert!(!out_dir.join("bad.mp3").exists());

        let events = events.into_inner().unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(events.iter().filter(|(k, _)| *k == "started").count(), 3);
        let last = events
            .iter()
            .map(|(_, p)| *p)
            .max_by_key(|p| p.done)
            .unwrap();
        assert_eq!(
            last,
            BatchProgress {
                done: 3,
                total: 3,
                converted: 2,
                failed: 1
            }
        );
        assert!((last.fraction() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_same_stem_inputs_do_not_overwrite_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let key = b"same-stem";
        let first = dir.path().join("x").join("song.ncm");
        let second = dir.path().join("y").join("song.ncm");
        for (input, plain) in [(&first, b"FIRST"), (&second, b"OTHER")] {
            fs::create_dir(input.parent().unwrap()).unwrap();
            fs::write(
                input,
                container_bytes(&key_blob(key), b"", b"", &encrypt_payload(key, plain)),
            )
            .unwrap();
        }

        let out_dir = dir.path().join("out");
        fs::create_dir(&out_dir).unwrap();
        let report = convert_all(&[first.clone(), second.clone()], Some(&out_dir), |_, _| {});

        assert_eq!(report.converted.len(), 1);
        assert_eq!(report.failed.len(), 1);
        let (winner, output) = &report.converted[0];
        assert_eq!(output, &out_dir.join("song.mp3"));
        let (loser, error) = &report.failed[0];
        assert_ne!(winner, loser);
        assert!(matches!(error, NcmError::Io(e) if e.kind() == io::ErrorKind::AlreadyExists));

        let expected: &[u8] = if *winner == first { b"FIRST" } else { b"OTHER" };
        assert_eq!(fs::read(output).unwrap(), expected);
        assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 1);
    }

    #[test]
    fn test_empty_batch() {
        let report = convert_all(&[], None, |_, _| panic!("no events expected"));
        assert!(report.converted.is_empty());
        assert!(report.failed.is_empty());
        assert!((BatchProgress::default().fraction() - 1.0).abs() < f64::EPSILON);
    }
}
