//! Reconnecting push-feed worker.
//!
//! One connection at a time. Every complete line is parsed and handed to the
//! handler sequentially; a failing or panicking handler costs only that
//! payload. When the connection drops, or goes silent for longer than the
//! idle timeout, the worker waits the reconnect delay and dials again,
//! forever, until shutdown.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{FutureExt, Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use chron_core::error::ErrorCode;

use crate::ingestor::Ingestor;
use crate::lines::LineDecoder;
use crate::shutdown::Shutdown;

/// Receives each decoded push-feed payload.
pub trait PayloadHandler: Send {
    fn handle(
        &mut self,
        payload: Value,
        received_at: DateTime<Utc>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl PayloadHandler for Ingestor {
    async fn handle(&mut self, payload: Value, received_at: DateTime<Utc>) -> anyhow::Result<()> {
        let report = self.ingest_stream_payload(payload, received_at).await?;
        debug!(
            inserted = report.merged.inserted,
            merged = report.merged.merged,
            games = report.games,
            teams = report.teams,
            "stream payload ingested"
        );
        Ok(())
    }
}

/// Why [`consume`] stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server closed the body.
    Closed,
    /// No bytes arrived within the idle timeout.
    Idle,
    /// Shutdown was requested.
    Shutdown,
}

/// Counters kept across one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeStats {
    pub handled: usize,
    pub malformed: usize,
    pub oversized: usize,
    pub failed: usize,
}

/// Stream worker settings.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub url: String,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_line_bytes: usize,
}

/// Read `body` to completion, dispatching every payload line.
///
/// Each read waits at most `options.idle_timeout`; a silent connection ends
/// with [`StreamEnd::Idle`].
///
/// # Errors
///
/// Returns the body's own error when a chunk cannot be read; payload and
/// handler failures are logged and counted instead.
pub async fn consume<S, B, E, H>(
    body: S,
    handler: &mut H,
    shutdown: &mut Shutdown,
    options: &StreamOptions,
    stats: &mut ConsumeStats,
) -> Result<StreamEnd, E>
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: Send,
    H: PayloadHandler,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = LineDecoder::with_limit(options.max_line_bytes);
    loop {
        let next = tokio::select! {
            item = tokio::time::timeout(options.idle_timeout, body.next()) => item,
            () = shutdown.triggered() => return Ok(StreamEnd::Shutdown),
        };
        let Ok(next) = next else {
            return Ok(StreamEnd::Idle);
        };
        let Some(chunk) = next else {
            if let Some(line) = decoder.finish() {
                dispatch(handler, &line, stats).await;
            }
            return Ok(StreamEnd::Closed);
        };
        for line in decoder.push(chunk?.as_ref()) {
            dispatch(handler, &line, stats).await;
        }
        stats.oversized = decoder.dropped();
    }
}

async fn dispatch<H: PayloadHandler>(handler: &mut H, line: &str, stats: &mut ConsumeStats) {
    let payload: Value = match serde_json::from_str(line) {
        Ok(payload) => payload,
        Err(e) => {
            stats.malformed += 1;
            warn!(
                code = %ErrorCode::MalformedPayload,
                error = %e,
                "skipping unparsable stream line"
            );
            return;
        }
    };

    match AssertUnwindSafe(handler.handle(payload, Utc::now()))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => stats.handled += 1,
        Ok(Err(e)) => {
            stats.failed += 1;
            warn!(
                code = %ErrorCode::StoreWriteFailed,
                error = %format!("{e:#}"),
                "stream handler failed"
            );
        }
        Err(_) => {
            stats.failed += 1;
            error!(code = %ErrorCode::InternalUnexpected, "stream handler panicked");
        }
    }
}

/// Run the push-feed worker until shutdown.
pub async fn run_stream<H: PayloadHandler>(
    options: StreamOptions,
    mut handler: H,
    mut shutdown: Shutdown,
) {
    // No total timeout: the body is expected to stay open indefinitely.
    let client = match reqwest::Client::builder()
        .connect_timeout(options.connect_timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!(
                code = %ErrorCode::InternalUnexpected,
                error = %e,
                "cannot build stream client"
            );
            return;
        }
    };

    let mut attempts: u64 = 0;
    while !shutdown.is_triggered() {
        attempts += 1;
        info!(url = %options.url, attempt = attempts, "connecting to stream");

        let response = client
            .get(&options.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        match response {
            Ok(response) => {
                let mut stats = ConsumeStats::default();
                let body = response.bytes_stream();
                let end = consume(body, &mut handler, &mut shutdown, &options, &mut stats).await;
                info!(
                    handled = stats.handled,
                    malformed = stats.malformed,
                    oversized = stats.oversized,
                    failed = stats.failed,
                    "stream connection finished"
                );
                match end {
                    Ok(StreamEnd::Shutdown) => break,
                    Ok(StreamEnd::Closed) => {
                        warn!(code = %ErrorCode::StreamDisconnected, "stream closed by server");
                    }
                    Ok(StreamEnd::Idle) => {
                        warn!(
                            code = %ErrorCode::StreamDisconnected,
                            idle_ms = options.idle_timeout.as_millis(),
                            "stream went silent"
                        );
                    }
                    Err(e) => {
                        warn!(
                            code = %ErrorCode::StreamDisconnected,
                            error = %e,
                            "stream read failed"
                        );
                    }
                }
            }
            Err(e) => {
                warn!(code = %ErrorCode::StreamDisconnected, error = %e, "stream connect failed");
            }
        }

        if !shutdown.sleep(options.reconnect_delay).await {
            break;
        }
    }
    info!("stream worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::DEFAULT_MAX_LINE;
    use crate::shutdown;
    use futures_util::stream;
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recording {
        seen: Vec<Value>,
    }

    impl PayloadHandler for Recording {
        async fn handle(&mut self, payload: Value, _at: DateTime<Utc>) -> anyhow::Result<()> {
            if payload.get("fail").is_some() {
                anyhow::bail!("refusing payload");
            }
            assert!(payload.get("panic").is_none(), "handler blew up");
            self.seen.push(payload);
            Ok(())
        }
    }

    fn options(idle_ms: u64) -> StreamOptions {
        StreamOptions {
            url: "http://unused/stream".to_string(),
            reconnect_delay: Duration::from_millis(10),
            connect_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_millis(idle_ms),
            max_line_bytes: DEFAULT_MAX_LINE,
        }
    }

    fn body(
        chunks: &[&'static str],
    ) -> impl Stream<Item = Result<&'static [u8], Infallible>> + Send {
        stream::iter(chunks.iter().map(|c| Ok(c.as_bytes())).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn lines_reassembled_across_chunks() {
        let (_trigger, mut stop) = shutdown::channel();
        let mut handler = Recording::default();
        let mut stats = ConsumeStats::default();

        let end = consume(
            body(&["data: {\"n\"", ":1}\n\ndata: {\"n\":2}\n", "{\"n\":3}"]),
            &mut handler,
            &mut stop,
            &options(1000),
            &mut stats,
        )
        .await
        .expect("infallible body");

        assert_eq!(end, StreamEnd::Closed);
        let ns: Vec<i64> = handler.seen.iter().filter_map(|v| v["n"].as_i64()).collect();
        assert_eq!(ns, vec![1, 2, 3]);
        assert_eq!(stats.handled, 3);
    }

    #[tokio::test]
    async fn bad_payloads_do_not_stop_the_stream() {
        let (_trigger, mut stop) = shutdown::channel();
        let mut handler = Recording::default();
        let mut stats = ConsumeStats::default();
        let mut opts = options(1000);
        opts.max_line_bytes = 16;

        consume(
            body(&[
                "{\"n\":1}\nnot json\n{\"fail\":true}\n{\"panic\":true}\n",
                "{\"padding\":\"xxxxxxxxxxxx\"}\n{\"n\":2}\n",
            ]),
            &mut handler,
            &mut stop,
            &opts,
            &mut stats,
        )
        .await
        .expect("infallible body");

        assert_eq!(handler.seen.len(), 2);
        assert_eq!(
            stats,
            ConsumeStats {
                handled: 2,
                malformed: 1,
                oversized: 1,
                failed: 2,
            }
        );
    }

    #[tokio::test]
    async fn shutdown_ends_an_idle_stream() {
        let (trigger, mut stop) = shutdown::channel();
        let mut handler = Recording::default();
        let mut stats = ConsumeStats::default();
        trigger.trigger();

        let end = consume(
            stream::pending::<Result<&'static [u8], Infallible>>(),
            &mut handler,
            &mut stop,
            &options(60_000),
            &mut stats,
        )
        .await
        .expect("infallible body");
        assert_eq!(end, StreamEnd::Shutdown);
    }

    #[tokio::test]
    async fn silent_body_times_out() {
        let (_trigger, mut stop) = shutdown::channel();
        let mut handler = Recording::default();
        let mut stats = ConsumeStats::default();
        let stalled = body(&["{\"n\":1}\n"]).chain(stream::pending());

        let end = consume(stalled, &mut handler, &mut stop, &options(50), &mut stats)
            .await
            .expect("infallible body");
        assert_eq!(end, StreamEnd::Idle);
        assert_eq!(handler.seen.len(), 1);
    }

    #[tokio::test]
    async fn read_error_is_returned() {
        let (_trigger, mut stop) = shutdown::channel();
        let mut handler = Recording::default();
        let mut stats = ConsumeStats::default();
        let failing = stream::iter(vec![Ok(&b"{\"n\":1}\n"[..]), Err("connection reset")]);

        let err = consume(failing, &mut handler, &mut stop, &options(1000), &mut stats)
            .await
            .expect_err("read error surfaces");
        assert_eq!(err, "connection reset");
        assert_eq!(handler.seen.len(), 1);
    }

    /// Serves one payload per connection, then holds the socket open without
    /// sending anything else.
    async fn stalling_server(connections: Arc<AtomicUsize>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\n\
                          content-type: text/event-stream\r\n\
                          transfer-encoding: chunked\r\n\r\n\
                          8\r\n{\"n\":1}\n\r\n",
                    )
                    .await;
                held.push(socket);
            }
        });
        format!("http://{addr}/stream")
    }

    #[tokio::test]
    async fn stalled_connection_is_redialled() {
        let connections = Arc::new(AtomicUsize::new(0));
        let url = stalling_server(Arc::clone(&connections)).await;

        let (trigger, stop) = shutdown::channel();
        let opts = StreamOptions {
            url,
            ..options(100)
        };
        let worker = tokio::spawn(run_stream(opts, Recording::default(), stop));

        tokio::time::sleep(Duration::from_millis(900)).await;
        trigger.trigger();
        worker.await.expect("stream worker exits");

        let dialled = connections.load(Ordering::SeqCst);
        assert!(dialled >= 2, "expected a redial after going silent, saw {dialled}");
    }
}
