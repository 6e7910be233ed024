use super::AudioFile;

/// Result of merging candidate files into the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddOutcome {
    /// Candidates that passed the audio format filter.
    pub accepted: usize,
    /// Accepted candidates that were not already present.
    pub added: usize,
    /// Accepted candidates dropped because (name, size) was already present.
    pub duplicates: usize,
    /// Candidates that failed the format filter.
    pub rejected: usize,
}

impl AddOutcome {
    /// True when nothing passed the filter; callers surface this to the user.
    pub fn is_rejected(&self) -> bool {
        self.accepted == 0
    }
}

/// Ordered set of selected files, unique by (name, size).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedFileSet {
    files: Vec<AudioFile>,
}

impl UploadedFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter candidates to supported audio and append the ones not yet present.
    ///
    /// If no candidate passes the filter the set is left untouched.
    pub fn add_files(&mut self, candidates: impl IntoIterator<Item = AudioFile>) -> AddOutcome {
        let mut outcome = AddOutcome::default();
        let accepted: Vec<AudioFile> = candidates
            .into_iter()
            .filter(|file| {
                let ok = file.is_supported_audio();
                if !ok {
                    outcome.rejected += 1;
                }
                ok
            })
            .collect();
        outcome.accepted = accepted.len();

        for file in accepted {
            if self.contains(&file) {
                outcome.duplicates += 1;
            } else {
                self.files.push(file);
                outcome.added += 1;
            }
        }
        outcome
    }

    /// Remove the file at `index`. Out of range indices are ignored.
    pub fn remove_file(&mut self, index: usize) -> Option<AudioFile> {
        if index < self.files.len() {
            Some(self.files.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn contains(&self, file: &AudioFile) -> bool {
        self.files
            .iter()
            .any(|f| f.dedupe_key() == file.dedupe_key())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[AudioFile] {
        &self.files
    }

    pub fn first(&self) -> Option<&AudioFile> {
        self.files.first()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}
