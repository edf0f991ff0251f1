/// How `initialize` binds a backend, chosen from the acquisition's mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPlan {
    /// Read an acquisition already on disk, in place.
    OpenOnDisk,
    /// Write a new acquisition to disk.
    CreateOnDisk,
    /// Keep a new acquisition in memory.
    InMemory,
    /// Load an acquisition from disk into memory and release the disk reader.
    CopyIntoMemory,
}

impl BackendPlan {
    pub fn select(disk_cached: bool, existing: bool) -> Self {
        match (disk_cached, existing) {
            (true, true) => BackendPlan::OpenOnDisk,
            (true, false) => BackendPlan::CreateOnDisk,
            (false, false) => BackendPlan::InMemory,
            (false, true) => BackendPlan::CopyIntoMemory,
        }
    }

    pub fn reads_existing(&self) -> bool {
        matches!(self, BackendPlan::OpenOnDisk | BackendPlan::CopyIntoMemory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_flag_pair_has_one_plan() {
        assert_eq!(BackendPlan::select(true, true), BackendPlan::OpenOnDisk);
        assert_eq!(BackendPlan::select(true, false), BackendPlan::CreateOnDisk);
        assert_eq!(BackendPlan::select(false, false), BackendPlan::InMemory);
        assert_eq!(BackendPlan::select(false, true), BackendPlan::CopyIntoMemory);
        assert!(BackendPlan::CopyIntoMemory.reads_existing());
        assert!(!BackendPlan::CreateOnDisk.reads_existing());
    }
}
