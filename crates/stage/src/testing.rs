//! In-memory asset source with per-path latency, gates and stalls for
//! pipeline and mount tests.

use showcase_assets::{AssetBytes, AssetError, AssetSource, fixtures};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// How long a gated fetch waits before giving up.
const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Yields once to the executor.
struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemorySource {
    files: BTreeMap<String, Vec<u8>>,
    delays: BTreeMap<String, u32>,
    /// Path → path whose fetch must start first.
    gates: BTreeMap<String, String>,
    stalled: Vec<String>,
    fetched: RefCell<Vec<String>>,
}

impl MemorySource {
    /// All three showcase assets under their default names.
    pub(crate) fn complete() -> Self {
        Self::default()
            .with_file(
                "environment.hdr",
                fixtures::uniform_hdr(8, 4, [0.5, 0.5, 0.5]).unwrap(),
            )
            .with_file("model-transformed.glb", fixtures::triangle_glb(&[]))
            .with_file(
                "helvetiker_regular.typeface.json",
                fixtures::box_typeface_json().into_bytes(),
            )
    }

    pub(crate) fn with_file(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(path.to_string(), bytes);
        self
    }

    pub(crate) fn without(mut self, path: &str) -> Self {
        self.files.remove(path);
        self
    }

    /// Make `path` take `polls` executor round trips to arrive.
    pub(crate) fn with_delay(mut self, path: &str, polls: u32) -> Self {
        self.delays.insert(path.to_string(), polls);
        self
    }

    /// Hold `path` back until `after` has been fetched. Only a pipeline that
    /// keeps both fetches in flight at once gets past the gate.
    pub(crate) fn with_gate(mut self, path: &str, after: &str) -> Self {
        self.gates.insert(path.to_string(), after.to_string());
        self
    }

    /// Make `path` never arrive.
    pub(crate) fn stalled(mut self, path: &str) -> Self {
        self.stalled.push(path.to_string());
        self
    }

    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.borrow().clone()
    }
}

impl AssetSource for MemorySource {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<AssetBytes, AssetError>> {
        self.fetched.borrow_mut().push(path.to_string());
        let bytes = self.files.get(path).cloned();
        let delay = self.delays.get(path).copied().unwrap_or(0);
        let gate = self.gates.get(path).cloned();
        let stalled = self.stalled.iter().any(|p| p == path);
        let path = path.to_string();
        async move {
            if stalled {
                std::future::pending::<()>().await;
            }
            for _ in 0..delay {
                YieldNow(false).await;
            }
            if let Some(after) = gate {
                let started = Instant::now();
                while !self.fetched.borrow().contains(&after) {
                    if started.elapsed() > GATE_TIMEOUT {
                        return Err(AssetError::Io {
                            path,
                            source: std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                format!("{after} was never fetched"),
                            ),
                        });
                    }
                    YieldNow(false).await;
                }
            }
            bytes.map(|b| AssetBytes::new(path.clone(), b)).ok_or_else(|| AssetError::Io {
                path,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such asset"),
            })
        }
    }
}
