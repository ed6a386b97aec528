use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::ext::BestEffortPathExt;
use crate::filesystem::{
    CopyError, NodeKind, TreeNode, TreeNodeError, copy_preserving_times, is_stale, probe,
};
use crate::reconciler::{RunReport, SyncAction};

/// Mirrors `source` onto `replica`. Holds no state between runs.
#[derive(Debug, Clone)]
pub struct Reconciler {
    source: PathBuf,
    replica: PathBuf,
}

impl Reconciler {
    pub fn new(source: impl Into<PathBuf>, replica: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            replica: replica.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn replica(&self) -> &Path {
        &self.replica
    }

    /// Performs one full run: every create and update happens before any
    /// pruning. The first filesystem error aborts the run.
    pub fn run(&self) -> Result<RunReport, ReconcileError> {
        info!(
            event = "run-started",
            "Started synchronization of {} to {}",
            self.source.display(),
            self.replica.display()
        );
        let started = Instant::now();
        let mut report = RunReport::default();

        self.check_source_root()?;
        self.ensure_replica_root(&mut report)?;
        self.propagate(&mut report)?;
        self.prune(&mut report)?;

        report.finish(started.elapsed());
        info!(
            event = "run-finished",
            "Finished synchronization of {} to {} ({} created, {} updated, {} removed in {:?})",
            self.source.display(),
            self.replica.display(),
            report.count("directory-created") + report.count("file-created"),
            report.count("file-updated"),
            report.count("file-removed") + report.count("directory-removed"),
            report.elapsed()
        );
        Ok(report)
    }

    fn check_source_root(&self) -> Result<(), ReconcileError> {
        let metadata = fs::metadata(&self.source).context(SourceRootSnafu {
            path: self.source.clone(),
        })?;
        ensure!(
            metadata.is_dir(),
            SourceRootNotDirectorySnafu {
                path: self.source.clone(),
            }
        );
        Ok(())
    }

    fn ensure_replica_root(&self, report: &mut RunReport) -> Result<(), ReconcileError> {
        let existing = fs::metadata(&self.replica).map(Some).or_else(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                Ok(None)
            } else {
                Err(err)
            }
        });

        match existing.context(InspectSnafu {
            path: self.replica.clone(),
        })? {
            Some(metadata) => {
                ensure!(
                    metadata.is_dir(),
                    ReplicaRootNotDirectorySnafu {
                        path: self.replica.clone(),
                    }
                );
            }
            None => {
                fs::create_dir_all(&self.replica).context(CreateDirectorySnafu {
                    path: self.replica.clone(),
                })?;
                report.record(SyncAction::DirectoryCreated {
                    path: self.replica.clone(),
                });
            }
        }
        Ok(())
    }

    /// Source to replica. Directories are yielded before their contents, so a
    /// replica directory always exists by the time its files are copied.
    /// Links are not descended into: a link to a directory becomes an empty
    /// replica directory and a link to a file is copied as its content.
    fn propagate(&self, report: &mut RunReport) -> Result<(), ReconcileError> {
        debug!("Propagating {} onto replica", self.source.display());

        for entry in WalkDir::new(&self.source).min_depth(1) {
            let entry = entry.context(WalkSnafu {
                root: self.source.clone(),
            })?;
            let node = TreeNode::resolving_links(&self.source, &entry).context(TreeNodeSnafu)?;
            let replica_path = node.under(&self.replica);

            match node.kind() {
                NodeKind::Directory => self.mirror_directory(&replica_path, report)?,
                NodeKind::File => self.mirror_file(entry.path(), &replica_path, report)?,
            }
        }

        Ok(())
    }

    fn mirror_directory(
        &self,
        replica_path: &Path,
        report: &mut RunReport,
    ) -> Result<(), ReconcileError> {
        let existing = probe(replica_path).context(InspectSnafu {
            path: replica_path.to_path_buf(),
        })?;

        match existing.as_ref().map(NodeKind::of) {
            Some(NodeKind::Directory) => return Ok(()),
            Some(NodeKind::File) => {
                // Type change: deleted here in pass 1, ahead of the prune pass
                self.remove_file(replica_path, report)?;
            }
            None => {}
        }

        fs::create_dir_all(replica_path).context(CreateDirectorySnafu {
            path: replica_path.to_path_buf(),
        })?;
        report.record(SyncAction::DirectoryCreated {
            path: replica_path.to_path_buf(),
        });
        Ok(())
    }

    fn mirror_file(
        &self,
        source_path: &Path,
        replica_path: &Path,
        report: &mut RunReport,
    ) -> Result<(), ReconcileError> {
        let existing = probe(replica_path).context(InspectSnafu {
            path: replica_path.to_path_buf(),
        })?;

        let action = match existing {
            None => SyncAction::FileCreated {
                source: source_path.to_path_buf(),
                replica: replica_path.to_path_buf(),
            },
            Some(metadata) if metadata.is_dir() => {
                // Type change: deleted here in pass 1, ahead of the prune pass
                self.remove_directory(replica_path, report)?;
                SyncAction::FileCreated {
                    source: source_path.to_path_buf(),
                    replica: replica_path.to_path_buf(),
                }
            }
            Some(metadata) if metadata.file_type().is_symlink() => {
                // Never write through a link planted in the replica
                self.remove_file(replica_path, report)?;
                SyncAction::FileCreated {
                    source: source_path.to_path_buf(),
                    replica: replica_path.to_path_buf(),
                }
            }
            Some(replica_metadata) => {
                let source_modified = fs::metadata(source_path)
                    .and_then(|metadata| metadata.modified())
                    .context(InspectSnafu {
                        path: source_path.to_path_buf(),
                    })?;
                let replica_modified = replica_metadata.modified().context(InspectSnafu {
                    path: replica_path.to_path_buf(),
                })?;

                if !is_stale(source_modified, replica_modified) {
                    return Ok(());
                }
                SyncAction::FileUpdated {
                    source: source_path.to_path_buf(),
                    replica: replica_path.to_path_buf(),
                }
            }
        };

        let bytes = copy_preserving_times(source_path, replica_path).context(CopyFileSnafu)?;
        debug!("Copied {} bytes to {}", bytes, replica_path.display());
        report.record(action);
        Ok(())
    }

    /// Replica to source. A removed directory is not descended into, so its
    /// contents are neither revisited nor reported.
    fn prune(&self, report: &mut RunReport) -> Result<(), ReconcileError> {
        debug!("Pruning {} against source", self.replica.display());

        let mut walker = WalkDir::new(&self.replica).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.context(WalkSnafu {
                root: self.replica.clone(),
            })?;
            let node = TreeNode::from_entry(&self.replica, &entry).context(TreeNodeSnafu)?;
            let source_path = node.under(&self.source);

            let in_source = source_path.try_exists().context(InspectSnafu {
                path: source_path.clone(),
            })?;
            if in_source {
                continue;
            }
            debug!("{} no longer exists in source", node.relative().display());

            match node.kind() {
                NodeKind::Directory => {
                    self.remove_directory(entry.path(), report)?;
                    walker.skip_current_dir();
                }
                NodeKind::File => self.remove_file(entry.path(), report)?,
            }
        }

        Ok(())
    }

    fn remove_file(&self, path: &Path, report: &mut RunReport) -> Result<(), ReconcileError> {
        fs::remove_file(path).context(RemoveFileSnafu {
            path: path.to_path_buf(),
        })?;
        report.record(SyncAction::FileRemoved {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn remove_directory(&self, path: &Path, report: &mut RunReport) -> Result<(), ReconcileError> {
        fs::remove_dir_all(path).context(RemoveDirectorySnafu {
            path: path.to_path_buf(),
        })?;
        report.record(SyncAction::DirectoryRemoved {
            path: path.to_path_buf(),
        });
        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum ReconcileError {
    #[snafu(display("Cannot access source root {}", path.best_effort_path_display()))]
    SourceRootError { path: PathBuf, source: io::Error },
    #[snafu(display("Source root {} is not a directory", path.best_effort_path_display()))]
    SourceRootNotDirectory { path: PathBuf },
    #[snafu(display("Replica root {} is not a directory", path.best_effort_path_display()))]
    ReplicaRootNotDirectory { path: PathBuf },
    #[snafu(display("Failed to traverse {}", root.best_effort_path_display()))]
    WalkError {
        root: PathBuf,
        source: walkdir::Error,
    },
    #[snafu(display("Failed to classify traversal entry"))]
    TreeNodeError { source: TreeNodeError },
    #[snafu(display("Failed to inspect {}", path.best_effort_path_display()))]
    InspectError { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to create directory {}", path.best_effort_path_display()))]
    CreateDirectoryError { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to copy file"))]
    CopyFileError { source: CopyError },
    #[snafu(display("Failed to remove file {}", path.best_effort_path_display()))]
    RemoveFileError { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to remove directory {}", path.best_effort_path_display()))]
    RemoveDirectoryError { path: PathBuf, source: io::Error },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use std::collections::BTreeMap;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct Trees {
        _temp_dir: TempDir,
        source: PathBuf,
        replica: PathBuf,
    }

    impl Trees {
        fn reconciler(&self) -> Reconciler {
            Reconciler::new(&self.source, &self.replica)
        }
    }

    #[fixture]
    fn trees() -> Trees {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("source");
        let replica = temp_dir.path().join("replica");
        fs::create_dir(&source).expect("Failed to create source");
        fs::create_dir(&replica).expect("Failed to create replica");
        Trees {
            _temp_dir: temp_dir,
            source,
            replica,
        }
    }

    fn t1() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000)
    }

    fn t2() -> SystemTime {
        t1() + Duration::from_secs(60)
    }

    fn write_file(root: &Path, relative: &str, content: &str, mtime: SystemTime) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(&path, content).expect("Failed to write file");
        set_mtime(&path, mtime);
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .expect("Failed to open file for stamping")
            .set_modified(time)
            .expect("Failed to set modification time");
    }

    fn mtime(path: &Path) -> SystemTime {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .expect("Failed to read mtime")
    }

    /// Relative path to file contents, `None` for directories.
    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<String>> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|entry| {
                let entry = entry.expect("Failed to walk tree");
                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .expect("Entry outside root")
                    .to_path_buf();
                let content = if entry.file_type().is_dir() {
                    None
                } else {
                    Some(fs::read_to_string(entry.path()).expect("Failed to read file"))
                };
                (relative, content)
            })
            .collect()
    }

    #[rstest]
    fn copies_missing_file_into_empty_replica(trees: Trees) {
        write_file(&trees.source, "a/b.txt", "X", t1());

        let report = trees.reconciler().run().expect("Run failed");

        assert_eq!(
            fs::read_to_string(trees.replica.join("a/b.txt")).expect("Missing replica file"),
            "X"
        );
        assert_eq!(mtime(&trees.replica.join("a/b.txt")), t1());
        assert_eq!(
            report.actions(),
            &[
                SyncAction::DirectoryCreated {
                    path: trees.replica.join("a"),
                },
                SyncAction::FileCreated {
                    source: trees.source.join("a/b.txt"),
                    replica: trees.replica.join("a/b.txt"),
                },
            ]
        );
    }

    #[rstest]
    fn updates_file_older_than_source(trees: Trees) {
        write_file(&trees.replica, "a/b.txt", "old", t1());
        write_file(&trees.source, "a/b.txt", "new", t2());

        let report = trees.reconciler().run().expect("Run failed");

        let replica_file = trees.replica.join("a/b.txt");
        assert_eq!(fs::read_to_string(&replica_file).expect("Missing file"), "new");
        assert_eq!(mtime(&replica_file), t2());
        assert_eq!(
            report.actions(),
            &[SyncAction::FileUpdated {
                source: trees.source.join("a/b.txt"),
                replica: replica_file.clone(),
            }]
        );
    }

    #[rstest]
    #[case::equal(t1(), t1())]
    #[case::replica_newer(t1(), t2())]
    fn leaves_current_file_untouched(
        trees: Trees,
        #[case] source_time: SystemTime,
        #[case] replica_time: SystemTime,
    ) {
        write_file(&trees.source, "b.txt", "source", source_time);
        write_file(&trees.replica, "b.txt", "replica", replica_time);

        let report = trees.reconciler().run().expect("Run failed");

        let replica_file = trees.replica.join("b.txt");
        assert!(report.is_noop());
        assert_eq!(
            fs::read_to_string(&replica_file).expect("Missing file"),
            "replica"
        );
        assert_eq!(mtime(&replica_file), replica_time);
    }

    #[rstest]
    fn removes_directory_missing_from_source(trees: Trees) {
        write_file(&trees.replica, "c/d.txt", "stale", t1());
        write_file(&trees.replica, "c/e/f.txt", "stale", t1());

        let report = trees.reconciler().run().expect("Run failed");

        assert!(!trees.replica.join("c").exists());
        assert_eq!(
            report.actions(),
            &[SyncAction::DirectoryRemoved {
                path: trees.replica.join("c"),
            }]
        );
    }

    #[rstest]
    fn removes_file_missing_from_source(trees: Trees) {
        write_file(&trees.source, "keep.txt", "keep", t1());
        write_file(&trees.replica, "keep.txt", "keep", t1());
        write_file(&trees.replica, "drop.txt", "drop", t1());

        let report = trees.reconciler().run().expect("Run failed");

        assert!(trees.replica.join("keep.txt").exists());
        assert!(!trees.replica.join("drop.txt").exists());
        assert_eq!(
            report.actions(),
            &[SyncAction::FileRemoved {
                path: trees.replica.join("drop.txt"),
            }]
        );
    }

    #[rstest]
    fn identical_trees_produce_no_actions(trees: Trees) {
        for root in [&trees.source, &trees.replica] {
            write_file(root, "a/b.txt", "same", t1());
            write_file(root, "c.txt", "same", t2());
            fs::create_dir_all(root.join("empty")).expect("Failed to create dir");
        }
        let before = snapshot(&trees.replica);

        let report = trees.reconciler().run().expect("Run failed");

        assert!(report.is_noop());
        assert_eq!(snapshot(&trees.replica), before);
        assert_eq!(mtime(&trees.replica.join("a/b.txt")), t1());
        assert_eq!(mtime(&trees.replica.join("c.txt")), t2());
    }

    #[rstest]
    fn second_run_is_a_noop(trees: Trees) {
        write_file(&trees.source, "a/b.txt", "X", t1());
        write_file(&trees.source, "a/c/d.txt", "Y", t2());
        fs::create_dir_all(trees.source.join("e/f")).expect("Failed to create dir");
        write_file(&trees.replica, "stale/g.txt", "Z", t1());

        let first = trees.reconciler().run().expect("First run failed");
        let second = trees.reconciler().run().expect("Second run failed");

        assert!(!first.is_noop());
        assert!(second.is_noop());
    }

    #[rstest]
    fn converges_replica_to_source(trees: Trees) {
        write_file(&trees.source, "top.txt", "top", t2());
        write_file(&trees.source, "a/b.txt", "b", t2());
        write_file(&trees.source, "a/deep/er/c.txt", "c", t1());
        fs::create_dir_all(trees.source.join("empty/nested")).expect("Failed to create dir");

        write_file(&trees.replica, "top.txt", "outdated", t1());
        write_file(&trees.replica, "a/stale.txt", "stale", t1());
        write_file(&trees.replica, "gone/x/y.txt", "gone", t1());

        trees.reconciler().run().expect("Run failed");

        assert_eq!(snapshot(&trees.replica), snapshot(&trees.source));
    }

    #[rstest]
    fn creates_empty_source_directories(trees: Trees) {
        fs::create_dir_all(trees.source.join("empty/inner")).expect("Failed to create dir");

        let report = trees.reconciler().run().expect("Run failed");

        assert!(trees.replica.join("empty/inner").is_dir());
        assert_eq!(
            fs::read_dir(trees.replica.join("empty/inner"))
                .expect("Failed to read dir")
                .count(),
            0
        );
        assert_eq!(report.count("directory-created"), 2);
    }

    #[rstest]
    fn nested_removal_is_reported_once(trees: Trees) {
        write_file(&trees.replica, "x/a.txt", "a", t1());
        write_file(&trees.replica, "x/y/b.txt", "b", t1());
        write_file(&trees.replica, "x/y/z/c.txt", "c", t1());

        let report = trees.reconciler().run().expect("Run failed");

        assert_eq!(report.actions().len(), 1);
        assert_eq!(report.count("directory-removed"), 1);
        assert_eq!(report.count("file-removed"), 0);
    }

    #[rstest]
    fn file_replaced_by_directory_is_recreated(trees: Trees) {
        write_file(&trees.source, "item/inner.txt", "inner", t1());
        write_file(&trees.replica, "item", "was a file", t1());

        let report = trees.reconciler().run().expect("Run failed");

        assert!(trees.replica.join("item").is_dir());
        assert_eq!(
            fs::read_to_string(trees.replica.join("item/inner.txt")).expect("Missing file"),
            "inner"
        );
        assert_eq!(
            report.actions(),
            &[
                SyncAction::FileRemoved {
                    path: trees.replica.join("item"),
                },
                SyncAction::DirectoryCreated {
                    path: trees.replica.join("item"),
                },
                SyncAction::FileCreated {
                    source: trees.source.join("item/inner.txt"),
                    replica: trees.replica.join("item/inner.txt"),
                },
            ]
        );
    }

    #[rstest]
    fn directory_replaced_by_file_is_recreated(trees: Trees) {
        write_file(&trees.source, "item", "now a file", t1());
        write_file(&trees.replica, "item/old.txt", "old", t2());

        let report = trees.reconciler().run().expect("Run failed");

        assert!(trees.replica.join("item").is_file());
        assert_eq!(
            fs::read_to_string(trees.replica.join("item")).expect("Missing file"),
            "now a file"
        );
        assert_eq!(
            report.actions(),
            &[
                SyncAction::DirectoryRemoved {
                    path: trees.replica.join("item"),
                },
                SyncAction::FileCreated {
                    source: trees.source.join("item"),
                    replica: trees.replica.join("item"),
                },
            ]
        );
    }

    #[rstest]
    fn creates_missing_replica_root(trees: Trees) {
        write_file(&trees.source, "a.txt", "a", t1());
        let replica = trees.replica.join("not/yet");

        let report = Reconciler::new(&trees.source, &replica)
            .run()
            .expect("Run failed");

        assert_eq!(
            fs::read_to_string(replica.join("a.txt")).expect("Missing file"),
            "a"
        );
        assert_eq!(
            report.actions().first(),
            Some(&SyncAction::DirectoryCreated {
                path: replica.clone(),
            })
        );
    }

    #[rstest]
    fn missing_source_root_fails_without_touching_replica(trees: Trees) {
        write_file(&trees.replica, "keep.txt", "keep", t1());

        let result = Reconciler::new(trees.source.join("missing"), &trees.replica).run();

        assert!(matches!(result, Err(ReconcileError::SourceRootError { .. })));
        assert!(trees.replica.join("keep.txt").exists());
    }

    #[rstest]
    fn file_as_source_root_is_rejected(trees: Trees) {
        write_file(&trees.source, "file.txt", "x", t1());

        let result = Reconciler::new(trees.source.join("file.txt"), &trees.replica).run();

        assert!(matches!(
            result,
            Err(ReconcileError::SourceRootNotDirectory { .. })
        ));
    }

    #[rstest]
    fn file_as_replica_root_is_rejected(trees: Trees) {
        write_file(&trees.replica, "file.txt", "x", t1());

        let result = Reconciler::new(&trees.source, trees.replica.join("file.txt")).run();

        assert!(matches!(
            result,
            Err(ReconcileError::ReplicaRootNotDirectory { .. })
        ));
    }

    #[cfg(unix)]
    #[rstest]
    fn replica_symlink_is_pruned_without_following(trees: Trees) {
        let outside = trees.source.parent().expect("No parent").join("outside");
        write_file(&outside, "precious.txt", "keep me", t1());
        std::os::unix::fs::symlink(&outside, trees.replica.join("link"))
            .expect("Failed to create symlink");

        let report = trees.reconciler().run().expect("Run failed");

        assert!(outside.join("precious.txt").exists());
        assert!(fs::symlink_metadata(trees.replica.join("link")).is_err());
        assert_eq!(
            report.actions(),
            &[SyncAction::FileRemoved {
                path: trees.replica.join("link"),
            }]
        );
    }

    #[cfg(unix)]
    #[rstest]
    fn replica_symlink_in_place_of_file_is_replaced(trees: Trees) {
        let outside = trees.source.parent().expect("No parent").join("outside");
        write_file(&outside, "victim.txt", "untouched", t1());
        write_file(&trees.source, "a.txt", "fresh", t2());
        std::os::unix::fs::symlink(outside.join("victim.txt"), trees.replica.join("a.txt"))
            .expect("Failed to create symlink");

        trees.reconciler().run().expect("Run failed");

        assert_eq!(
            fs::read_to_string(outside.join("victim.txt")).expect("Missing file"),
            "untouched"
        );
        assert_eq!(
            fs::read_to_string(trees.replica.join("a.txt")).expect("Missing file"),
            "fresh"
        );
    }

    #[cfg(unix)]
    #[rstest]
    fn link_back_to_ancestor_does_not_block_the_run(trees: Trees) {
        write_file(&trees.source, "a/b.txt", "X", t1());
        std::os::unix::fs::symlink(&trees.source, trees.source.join("a/back"))
            .expect("Failed to create symlink");
        write_file(&trees.replica, "stale.txt", "stale", t1());

        let first = trees.reconciler().run().expect("First run failed");
        let second = trees.reconciler().run().expect("Second run failed");

        assert_eq!(
            fs::read_to_string(trees.replica.join("a/b.txt")).expect("Missing file"),
            "X"
        );
        let mirrored_link = trees.replica.join("a/back");
        assert!(
            fs::symlink_metadata(&mirrored_link)
                .expect("Missing mirrored link")
                .is_dir()
        );
        assert_eq!(
            fs::read_dir(&mirrored_link)
                .expect("Failed to read dir")
                .count(),
            0
        );
        assert!(!trees.replica.join("stale.txt").exists());
        assert_eq!(first.count("file-removed"), 1);
        assert!(second.is_noop());
    }

    #[cfg(unix)]
    #[rstest]
    fn source_symlink_is_mirrored_as_content(trees: Trees) {
        let outside = trees.source.parent().expect("No parent").join("outside");
        write_file(&outside, "target.txt", "linked", t1());
        std::os::unix::fs::symlink(outside.join("target.txt"), trees.source.join("link.txt"))
            .expect("Failed to create symlink");

        trees.reconciler().run().expect("Run failed");

        let replica_link = trees.replica.join("link.txt");
        assert!(
            !fs::symlink_metadata(&replica_link)
                .expect("Missing replica file")
                .file_type()
                .is_symlink()
        );
        assert_eq!(
            fs::read_to_string(&replica_link).expect("Missing file"),
            "linked"
        );
    }
}
