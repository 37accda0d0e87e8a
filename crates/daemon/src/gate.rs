use std::path::Path;

use crate::planner::JobDescriptor;

/// Check whether a job's output already exists, so the engine need not run.
///
/// Read-only. Nothing reserves the path between this check and the engine's
/// write: two batches producing the same output can both pass, and the last
/// writer wins.
pub fn is_already_satisfied(job: &JobDescriptor) -> bool {
    output_exists(&job.output_path)
}

fn output_exists(path: &Path) -> bool {
    path.try_exists().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn descriptor(output: PathBuf) -> JobDescriptor {
        JobDescriptor {
            source_path: PathBuf::from("/in/a.mp4"),
            output_path: output,
            is_full: true,
            start_seconds: None,
            duration_seconds: None,
            encoding: None,
        }
    }

    #[test]
    fn test_missing_output_is_not_satisfied() {
        let dir = tempfile::tempdir().unwrap();
        let job = descriptor(dir.path().join("a_full_video.mp4"));
        assert!(!is_already_satisfied(&job));
    }

    #[test]
    fn test_existing_output_is_satisfied() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a_full_video.mp4");
        fs::write(&output, b"").unwrap();

        let job = descriptor(output.clone());
        assert!(is_already_satisfied(&job));
        // The check must not touch the file.
        assert_eq!(fs::metadata(&output).unwrap().len(), 0);
    }
}
