use gix::{ObjectId, Repository};

/// A throwaway repository the tests build commits in directly through the
/// object database, no git binary required.
pub struct TestRepo {
    // dropping the TempDir deletes the repository
    _dir: tempfile::TempDir,
    pub repo: Repository,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temporary directory");
        gix::init(dir.path()).expect("init repository");

        let config = dir.path().join(".git").join("config");
        let mut contents = std::fs::read_to_string(&config).expect("read fresh config");
        contents.push_str("[user]\n\tname = A U Thor\n\temail = author@example.com\n");
        std::fs::write(&config, contents).expect("write identity");

        let repo = gix::open(dir.path()).expect("reopen repository");
        Self { _dir: dir, repo }
    }

    pub fn blob(&self, data: &[u8]) -> ObjectId {
        self.repo.write_blob(data).expect("write blob").detach()
    }

    pub fn tree(&self, entries: &[(&str, ObjectId)]) -> ObjectId {
        let mut entries: Vec<_> = entries
            .iter()
            .map(|(name, oid)| gix::objs::tree::Entry {
                mode: gix::objs::tree::EntryKind::Blob.into(),
                filename: (*name).into(),
                oid: *oid,
            })
            .collect();
        entries.sort();
        self.repo
            .write_object(&gix::objs::Tree { entries })
            .expect("write tree")
            .detach()
    }

    pub fn commit(&self, message: &str, tree: ObjectId, parents: &[ObjectId]) -> ObjectId {
        self.repo
            .commit("HEAD", message, tree, parents.iter().copied())
            .expect("write commit")
            .detach()
    }
}
