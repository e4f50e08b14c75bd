use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::link::StdioHostLink;
use super::transport::{FrameReader, FrameWriter, TransportError};
use super::types::{AgentFrame, HostCommand, InboundFrame};
use crate::config::InterceptorConfig;
use crate::coordinator::{self, service::CoordinatorHandle};
use crate::utils::fetcher::{ByteSource, HttpByteSource};

/// Serves the host over stdin/stdout until the host closes stdin.
pub async fn run(config: &InterceptorConfig) -> Result<()> {
    let source = Arc::new(HttpByteSource::new()?);
    let (reader, writer) = super::transport::stdio();
    serve(config, source, reader, writer).await
}

/// Bridge loop: host events go to the coordinator in arrival order, agent
/// requests are answered on their own tasks so a slow fetch never delays
/// event processing.
pub async fn serve<R, W>(
    config: &InterceptorConfig,
    source: Arc<dyn ByteSource>,
    mut reader: FrameReader<R>,
    writer: FrameWriter<W>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_loop(writer, outbound_rx));

    let host = Arc::new(StdioHostLink::new(outbound_tx.clone()));
    let (handle, coordinator_task) = coordinator::spawn_with(config, source, host);
    let mut pending = JoinSet::new();

    info!("Bridge listening on stdio");

    loop {
        match reader.read_frame().await {
            Ok(Some(InboundFrame::Event(event))) => {
                if handle.dispatch(event).await.is_err() {
                    error!("Coordinator stopped unexpectedly");
                    break;
                }
            }
            Ok(Some(InboundFrame::Agent(frame))) => {
                pending.spawn(answer(handle.clone(), frame, outbound_tx.clone()));
            }
            Ok(None) => {
                info!("Host disconnected");
                break;
            }
            Err(TransportError::InvalidFrame(reason)) => {
                warn!("Skipping frame: {}", reason);
            }
            Err(e) => {
                error!("Host transport failed: {}", e);
                break;
            }
        }
    }

    while pending.join_next().await.is_some() {}

    // Dropping the last handle stops the coordinator, which releases its link
    drop(handle);
    let _ = coordinator_task.await;
    drop(outbound_tx);
    writer_task.await??;

    Ok(())
}

async fn answer(
    handle: CoordinatorHandle,
    frame: AgentFrame,
    outbound: mpsc::UnboundedSender<HostCommand>,
) {
    let AgentFrame {
        id,
        context_id,
        request,
    } = frame;

    match handle.answer(context_id, request).await {
        Ok(result) => {
            if outbound.send(HostCommand::Response { id, result }).is_err() {
                debug!("Host writer gone before reply");
            }
        }
        Err(e) => error!("Could not answer agent request: {}", e),
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::UnboundedReceiver<HostCommand>,
) -> Result<()> {
    while let Some(command) = outbound.recv().await {
        writer.write_command(&command).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::fetcher::tests::{pdf_response, ScriptedSource};
    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn run_session(frames: &[&str], source: Arc<ScriptedSource>) -> Vec<Value> {
        let (mut host_in, bridge_in) = tokio::io::duplex(1 << 20);
        let (bridge_out, mut host_out) = tokio::io::duplex(1 << 20);

        let config = InterceptorConfig::default();
        let bridge = tokio::spawn(async move {
            serve(
                &config,
                source,
                FrameReader::new(bridge_in),
                FrameWriter::new(bridge_out),
            )
            .await
        });

        for frame in frames {
            host_in.write_all(frame.as_bytes()).await.unwrap();
            host_in.write_all(b"\n").await.unwrap();
        }
        drop(host_in);

        let mut output = String::new();
        host_out.read_to_string(&mut output).await.unwrap();
        bridge.await.unwrap().unwrap();

        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn find<'a>(frames: &'a [Value], predicate: impl Fn(&Value) -> bool) -> Option<&'a Value> {
        frames.iter().find(|f| predicate(f))
    }

    #[tokio::test]
    async fn pdf_session_over_stdio() {
        let source = ScriptedSource::new(vec![pdf_response(b"%PDF-1.6")]);
        let frames = run_session(
            &[
                r#"{"type":"navigationStarted","contextId":1,"url":"https://site/doc.pdf","frameDepth":0}"#,
                r#"{"type":"responseReceived","contextId":1,"url":"https://site/doc.pdf","responseHeaders":[{"name":"Content-Type","value":"application/pdf"}]}"#,
                r#"{"type":"agentRequest","id":1,"contextId":1,"request":{"action":"shouldInjectPdf"}}"#,
                "this is not json",
                r#"{"type":"agentRequest","id":"f","contextId":1,"request":{"action":"fetchPdf","url":"https://site/doc.pdf"}}"#,
            ],
            source,
        )
        .await;

        assert_eq!(
            frames[0],
            json!({"type": "setRulesets", "enable": ["ruleset_1"], "disable": []})
        );
        assert_eq!(
            frames[1],
            json!({"type": "setBadge", "text": "ON", "color": "#4CAF50"})
        );
        assert!(find(&frames, |f| f
            == &json!({
                "type": "push",
                "contextId": 1,
                "message": {"action": "pdfDetected", "url": "https://site/doc.pdf"}
            }))
        .is_some());

        let inject = find(&frames, |f| f["type"] == "response" && f["id"] == json!(1)).unwrap();
        assert_eq!(
            inject["result"],
            json!({"shouldInject": true, "extensionEnabled": true, "pdfUrl": "https://site/doc.pdf"})
        );

        let fetch = find(&frames, |f| f["type"] == "response" && f["id"] == json!("f")).unwrap();
        assert_eq!(fetch["result"]["success"], json!(true));
        assert_eq!(fetch["result"]["data"], json!(b"%PDF-1.6".to_vec()));
    }

    #[tokio::test]
    async fn html_session_creates_nothing() {
        let frames = run_session(
            &[
                r#"{"type":"navigationCommitted","contextId":2,"url":"https://site/page"}"#,
                r#"{"type":"responseReceived","contextId":2,"url":"https://site/page","responseHeaders":[{"name":"content-type","value":"text/html"}]}"#,
                r#"{"type":"agentRequest","id":9,"contextId":2,"request":{"action":"shouldInjectPdf","url":"https://site/page"}}"#,
                r#"{"type":"agentRequest","id":10,"contextId":2,"request":{"action":"getPdfUrl"}}"#,
            ],
            ScriptedSource::new(vec![]),
        )
        .await;

        assert!(find(&frames, |f| f["type"] == "push").is_none());
        let reply = find(&frames, |f| f["id"] == json!(9)).unwrap();
        assert_eq!(reply["result"]["shouldInject"], json!(false));
        let reply = find(&frames, |f| f["id"] == json!(10)).unwrap();
        assert_eq!(reply["result"], json!({"pdfUrl": null}));
    }

    #[tokio::test]
    async fn toggle_and_download_commands() {
        let frames = run_session(
            &[
                r#"{"type":"downloadStarted","downloadId":4,"url":"https://site/report","mime":"application/pdf"}"#,
                r#"{"type":"toggleClicked"}"#,
                r#"{"type":"downloadStarted","downloadId":5,"url":"https://site/other.pdf","mime":"application/pdf"}"#,
                r#"{"type":"agentRequest","id":1,"contextId":3,"request":{"action":"fetchPdf","url":"https://site/other.pdf"}}"#,
            ],
            ScriptedSource::new(vec![]),
        )
        .await;

        let opened: Vec<&Value> = frames
            .iter()
            .filter(|f| f["type"] == "openViewer")
            .collect();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0]["downloadId"], json!(4));
        assert_eq!(
            opened[0]["url"],
            json!("chrome-extension://local-pdf-viewer/viewer.html?src=https%3A%2F%2Fsite%2Freport")
        );

        assert!(find(&frames, |f| f
            == &json!({"type": "setBadge", "text": "OFF", "color": "#FF0000"}))
        .is_some());

        let reply = find(&frames, |f| f["type"] == "response").unwrap();
        assert_eq!(reply["result"]["errorKind"], json!("disabled"));
    }
}
