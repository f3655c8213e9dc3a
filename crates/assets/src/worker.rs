use crate::error::AssetError;
use futures::channel::oneshot;

/// Run blocking work (file reads, decoders, external programs) on its own
/// thread and await the result.
///
/// The calling executor stays free to poll other stages meanwhile. The
/// current tracing span follows the work onto the thread. Dropping the
/// returned future detaches the thread; its result is discarded.
pub async fn unblock<T, F>(label: &str, work: F) -> Result<T, AssetError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AssetError> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let span = tracing::Span::current();
    std::thread::Builder::new()
        .name(format!("asset-{label}"))
        .spawn(move || {
            let _entered = span.enter();
            // The receiver is gone when the caller stopped waiting.
            let _ = tx.send(work());
        })
        .map_err(|source| AssetError::Io {
            path: format!("worker thread for {label}"),
            source,
        })?;

    rx.await
        .map_err(|_| AssetError::WorkerLost(label.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn returns_work_result() {
        let value = pollster::block_on(unblock("sum", || Ok(2 + 2))).unwrap();
        assert_eq!(value, 4);
    }

    #[test]
    fn work_error_is_passed_through() {
        let err = pollster::block_on(unblock::<(), _>("fail", || {
            Err(AssetError::Codec("bad input".into()))
        }))
        .unwrap_err();
        assert!(matches!(err, AssetError::Codec(_)));
    }

    #[test]
    fn panicking_work_is_worker_lost() {
        let err = pollster::block_on(unblock::<(), _>("panic", || panic!("decoder crashed")))
            .unwrap_err();
        assert!(matches!(err, AssetError::WorkerLost(label) if label == "panic"));
    }

    #[test]
    fn blocked_work_does_not_stall_other_futures() {
        // The first job can only finish after the second one has run.
        let (tx, rx) = mpsc::channel::<()>();
        let waiting = unblock("wait", move || {
            rx.recv_timeout(Duration::from_secs(5))
                .map_err(|_| AssetError::Codec("never signalled".into()))
        });
        let signalling = async move {
            tx.send(()).map_err(|_| AssetError::Codec("receiver gone".into()))
        };
        let (a, b) = pollster::block_on(async { futures::join!(waiting, signalling) });
        assert!(a.is_ok());
        assert!(b.is_ok());
    }
}
