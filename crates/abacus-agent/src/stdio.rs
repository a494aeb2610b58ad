//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! One message (or batch) per line in, one response line out. Logs stay on
//! stderr so stdout carries nothing but protocol frames.

use abacus_rpc::{Dispatcher, MessageBatch, RpcResponse};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Serve `reader` until EOF, writing responses to `writer`.
pub async fn run<R, W>(dispatcher: &Dispatcher, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(reply) = answer(dispatcher, line).await {
            writer.write_all(reply.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }
    info!("stdin closed");
    Ok(())
}

async fn answer(dispatcher: &Dispatcher, line: &str) -> Option<String> {
    let batch = match MessageBatch::parse(line.as_bytes()) {
        Ok(batch) => batch,
        Err(err) => {
            debug!(error = %err, "undecodable line");
            return serde_json::to_string(&RpcResponse::from_error(None, &err)).ok();
        }
    };

    let batched = batch.batched;
    let mut responses = dispatcher.handle_batch(batch).await;
    if responses.is_empty() {
        return None;
    }
    if batched {
        serde_json::to_string(&responses).ok()
    } else {
        serde_json::to_string(&responses.swap_remove(0)).ok()
    }
}

/// Serve the process's own stdin/stdout.
pub async fn serve(dispatcher: Dispatcher) -> std::io::Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run(&dispatcher, stdin, tokio::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    async fn exchange(input: &str) -> Vec<Value> {
        let mut out = Vec::new();
        run(&Dispatcher::default(), input.as_bytes(), &mut out)
            .await
            .unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn answers_each_line_in_order() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"divide","arguments":{"a":10,"b":0}}}"#,
            "\n",
        );
        let out = exchange(input).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["id"], 1);
        assert_eq!(out[0]["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(out[1]["id"], 2);
        assert_eq!(out[1]["result"]["isError"], true);
    }

    #[tokio::test]
    async fn garbage_line_yields_parse_error() {
        let out = exchange("not json\n").await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["error"]["code"], -32700);
        assert_eq!(out[0]["id"], Value::Null);
    }

    #[tokio::test]
    async fn batch_line_yields_array() {
        let batch = json!([
            {"jsonrpc":"2.0","id":"a","method":"ping"},
            {"jsonrpc":"2.0","id":"b","method":"nope"}
        ]);
        let out = exchange(&format!("{batch}\n")).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0][0]["id"], "a");
        assert_eq!(out[0][1]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn eof_ends_cleanly() {
        assert!(exchange("").await.is_empty());
    }
}
