//! End-to-end runs of the mirror engine against an in-memory remote.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use capstan_core::{MirrorConfig, MirrorSession, Rule};
use capstan_fetch::{HttpClient, HttpResponse};

const BASE: &str = "http://cpan.test/";

#[derive(Clone, Default)]
struct FakeRemote {
    inner: Arc<Mutex<Remote>>,
}

#[derive(Default)]
struct Remote {
    files: HashMap<String, (Bytes, SystemTime)>,
    requests: Vec<String>,
}

impl FakeRemote {
    fn put(&self, path: &str, body: impl Into<Bytes>, mtime_secs: u64) {
        self.inner.lock().unwrap().files.insert(
            path.to_string(),
            (body.into(), UNIX_EPOCH + Duration::from_secs(mtime_secs)),
        );
    }

    fn remove(&self, path: &str) {
        self.inner.lock().unwrap().files.remove(path);
    }

    fn requests(&self) -> Vec<String> {
        self.inner.lock().unwrap().requests.clone()
    }

    fn clear_requests(&self) {
        self.inner.lock().unwrap().requests.clear();
    }
}

impl HttpClient for FakeRemote {
    type Error = std::io::Error;

    async fn get(
        &self,
        url: &str,
        if_modified_since: Option<SystemTime>,
    ) -> std::io::Result<HttpResponse> {
        let path = url.strip_prefix(BASE).unwrap_or(url).to_string();
        let mut remote = self.inner.lock().unwrap();
        remote.requests.push(path.clone());
        match remote.files.get(&path) {
            None => Ok(HttpResponse {
                status: 404,
                last_modified: None,
                body: Bytes::new(),
            }),
            Some((body, modified)) => {
                if let Some(since) = if_modified_since {
                    if since >= *modified {
                        return Ok(HttpResponse {
                            status: 304,
                            last_modified: Some(*modified),
                            body: Bytes::new(),
                        });
                    }
                }
                Ok(HttpResponse {
                    status: 200,
                    last_modified: Some(*modified),
                    body: body.clone(),
                })
            }
        }
    }
}

fn gz(text: &str) -> Bytes {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    Bytes::from(encoder.finish().unwrap())
}

fn packages_index(entries: &[(&str, &str, &str)]) -> Bytes {
    let mut text = format!(
        "File: 02packages.details.txt\n\
         URL: {BASE}modules/02packages.details.txt\n\
         Description: Package names\n\
         Line-Count: {}\n\
         \n",
        entries.len()
    );
    for (module, version, path) in entries {
        text.push_str(&format!("{module} {version} {path}\n"));
    }
    gz(&text)
}

/// A remote publishing modules A (by XYZZY) and B (by OPRIME).
fn seeded_remote() -> FakeRemote {
    let remote = FakeRemote::default();
    remote.put("authors/01mailrc.txt.gz", gz("alias XYZZY\nalias OPRIME\n"), 1_000);
    remote.put(
        "modules/02packages.details.txt.gz",
        packages_index(&[
            ("Acme::A", "1.0", "X/XY/XYZZY/A-1.0.tar.gz"),
            ("Bundle::B", "2.0", "O/OP/OPRIME/B-2.0.tar.gz"),
        ]),
        1_000,
    );
    remote.put("modules/03modlist.data.gz", gz("modlist\n"), 1_000);
    remote.put("authors/id/X/XY/XYZZY/A-1.0.tar.gz", "tar-a", 1_000);
    remote.put("authors/id/X/XY/XYZZY/CHECKSUMS", "sums-x", 1_000);
    remote.put("authors/id/O/OP/OPRIME/B-2.0.tar.gz", "tar-b", 1_000);
    remote.put("authors/id/O/OP/OPRIME/CHECKSUMS", "sums-o", 1_000);
    remote
}

async fn run(remote: &FakeRemote, local: &Path, configure: impl FnOnce(&mut MirrorConfig)) -> u32 {
    let mut config = MirrorConfig::new(local, BASE).unwrap();
    configure(&mut config);
    let mut session = MirrorSession::new(config, remote.clone()).unwrap();
    session.update_mirror().await.unwrap()
}

#[tokio::test]
async fn first_run_builds_the_complete_tree() {
    let remote = seeded_remote();
    let dir = tempfile::tempdir().unwrap();

    let changes = run(&remote, dir.path(), |_| {}).await;

    // Three indices, two archives, two checksum files.
    assert_eq!(changes, 7);
    for path in [
        "authors/01mailrc.txt.gz",
        "modules/02packages.details.txt.gz",
        "modules/03modlist.data.gz",
        "authors/id/X/XY/XYZZY/A-1.0.tar.gz",
        "authors/id/X/XY/XYZZY/CHECKSUMS",
        "authors/id/O/OP/OPRIME/B-2.0.tar.gz",
        "authors/id/O/OP/OPRIME/CHECKSUMS",
    ] {
        assert!(dir.path().join(path).is_file(), "missing {path}");
    }
    assert_eq!(
        fs::read(dir.path().join("authors/id/X/XY/XYZZY/A-1.0.tar.gz")).unwrap(),
        b"tar-a"
    );

    let manifest = fs::read_to_string(dir.path().join("RECENT")).unwrap();
    assert_eq!(
        manifest,
        "authors/01mailrc.txt.gz\n\
         authors/id/O/OP/OPRIME/B-2.0.tar.gz\n\
         authors/id/O/OP/OPRIME/CHECKSUMS\n\
         authors/id/X/XY/XYZZY/A-1.0.tar.gz\n\
         authors/id/X/XY/XYZZY/CHECKSUMS\n\
         modules/02packages.details.txt.gz\n\
         modules/03modlist.data.gz\n"
    );
}

#[tokio::test]
async fn unchanged_remote_makes_the_second_run_free() {
    let remote = seeded_remote();
    let dir = tempfile::tempdir().unwrap();

    run(&remote, dir.path(), |_| {}).await;
    remote.clear_requests();

    let changes = run(&remote, dir.path(), |_| {}).await;

    assert_eq!(changes, 0);
    // Only the three index probes went out; no archive was touched.
    let mut requests = remote.requests();
    requests.sort();
    assert_eq!(
        requests,
        [
            "authors/01mailrc.txt.gz",
            "modules/02packages.details.txt.gz",
            "modules/03modlist.data.gz",
        ]
    );
}

#[tokio::test]
async fn dropped_modules_are_reconciled_away() {
    let remote = seeded_remote();
    let dir = tempfile::tempdir().unwrap();
    run(&remote, dir.path(), |_| {}).await;

    // Upstream drops A, adds C.
    remote.put(
        "modules/02packages.details.txt.gz",
        packages_index(&[
            ("Bundle::B", "2.0", "O/OP/OPRIME/B-2.0.tar.gz"),
            ("Class::C", "1.0", "J/JK/JKL/C-1.0.tar.gz"),
        ]),
        2_000,
    );
    remote.put("authors/id/J/JK/JKL/C-1.0.tar.gz", "tar-c", 2_000);
    remote.put("authors/id/J/JK/JKL/CHECKSUMS", "sums-j", 2_000);
    remote.remove("authors/id/X/XY/XYZZY/A-1.0.tar.gz");
    remote.remove("authors/id/X/XY/XYZZY/CHECKSUMS");

    let changes = run(&remote, dir.path(), |_| {}).await;

    // The index plus C's archive and checksum file were updated.
    assert_eq!(changes, 3);
    assert!(dir.path().join("authors/id/J/JK/JKL/C-1.0.tar.gz").is_file());
    assert!(dir.path().join("authors/id/J/JK/JKL/CHECKSUMS").is_file());
    // A's archive and its now-orphaned CHECKSUMS are gone; B survives.
    assert!(!dir.path().join("authors/id/X/XY/XYZZY/A-1.0.tar.gz").exists());
    assert!(!dir.path().join("authors/id/X/XY/XYZZY/CHECKSUMS").exists());
    assert!(dir.path().join("authors/id/O/OP/OPRIME/B-2.0.tar.gz").is_file());
    assert!(dir.path().join("authors/id/O/OP/OPRIME/CHECKSUMS").is_file());

    let manifest = fs::read_to_string(dir.path().join("RECENT")).unwrap();
    assert_eq!(
        manifest,
        "authors/id/J/JK/JKL/C-1.0.tar.gz\n\
         authors/id/J/JK/JKL/CHECKSUMS\n\
         modules/02packages.details.txt.gz\n"
    );
}

#[tokio::test]
async fn cleanup_spares_hidden_files_but_not_strays() {
    let remote = seeded_remote();
    let dir = tempfile::tempdir().unwrap();
    run(&remote, dir.path(), |_| {}).await;

    let hidden = dir.path().join("authors/.gitignore");
    let stray = dir.path().join("authors/id/X/XY/XYZZY/leftover.tar.gz");
    fs::write(&hidden, b"x").unwrap();
    fs::write(&stray, b"x").unwrap();

    // Force a full pass so the reconciler runs again.
    run(&remote, dir.path(), |config| config.force = true).await;

    assert!(hidden.exists());
    assert!(!stray.exists());
}

#[tokio::test]
async fn exact_mirror_disables_deletion() {
    let remote = seeded_remote();
    let dir = tempfile::tempdir().unwrap();
    run(&remote, dir.path(), |_| {}).await;

    let stray = dir.path().join("authors/id/X/XY/XYZZY/leftover.tar.gz");
    fs::write(&stray, b"x").unwrap();

    run(&remote, dir.path(), |config| {
        config.force = true;
        config.exact_mirror = true;
    })
    .await;

    assert!(stray.exists());
}

#[tokio::test]
async fn path_filters_keep_archives_out() {
    let remote = seeded_remote();
    let dir = tempfile::tempdir().unwrap();

    run(&remote, dir.path(), |config| {
        config.path_filters = vec![Rule::pattern(r"^O/OP/").unwrap()];
    })
    .await;

    assert!(dir.path().join("authors/id/X/XY/XYZZY/A-1.0.tar.gz").is_file());
    assert!(!dir.path().join("authors/id/O/OP/OPRIME/B-2.0.tar.gz").exists());
    assert!(!dir.path().join("authors/id/O/OP/OPRIME/CHECKSUMS").exists());
}

#[tokio::test]
async fn also_mirror_paths_are_fetched_unfiltered() {
    let remote = seeded_remote();
    remote.put("indices/find-ls.gz", gz("listing\n"), 1_000);
    let dir = tempfile::tempdir().unwrap();

    run(&remote, dir.path(), |config| {
        config.also_mirror = vec!["indices/find-ls.gz".to_string()];
    })
    .await;

    assert!(dir.path().join("indices/find-ls.gz").is_file());
}

#[tokio::test]
async fn soft_failures_leave_the_rest_of_the_run_intact() {
    let remote = seeded_remote();
    // B's archive vanished from the remote; its fetch will 404.
    remote.remove("authors/id/O/OP/OPRIME/B-2.0.tar.gz");
    let dir = tempfile::tempdir().unwrap();

    let changes = run(&remote, dir.path(), |_| {}).await;

    // A and the indices made it; B is simply absent this run, and its
    // CHECKSUMS was never cascaded to.
    assert!(changes > 0);
    assert!(dir.path().join("authors/id/X/XY/XYZZY/A-1.0.tar.gz").is_file());
    assert!(!dir.path().join("authors/id/O/OP/OPRIME/B-2.0.tar.gz").exists());
    assert!(!dir.path().join("authors/id/O/OP/OPRIME/CHECKSUMS").exists());
}
