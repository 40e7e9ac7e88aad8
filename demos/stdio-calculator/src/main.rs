//! # Stdio Calculator
//!
//! Serves a small calculator over line-delimited JSON-RPC: one payload per
//! line on stdin, one reply per line on stdout. Notifications and batches of
//! notifications produce no output line. Logs go to stderr.
//!
//! ```text
//! $ echo '{"jsonrpc":"2.0","method":"math.add","params":{"a":2,"b":3},"id":1}' | stdio-calculator
//! {"jsonrpc":"2.0","result":5.0,"id":1}
//! $ stdio-calculator --spec
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use typed_rpc_server::prelude::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Print the schema snapshot as JSON and exit
    #[arg(long)]
    spec: bool,

    /// Reject batches with more entries than this
    #[arg(long)]
    max_batch_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Describe, Validate)]
#[serde(default)]
struct Operands {
    #[rpc(validate = "required")]
    a: f64,
    b: f64,
}

#[derive(Debug, Default, Deserialize, Describe, Validate)]
#[serde(default)]
struct Series {
    #[rpc(validate = "required,min=1")]
    values: Vec<f64>,
}

#[derive(Debug, Serialize, Describe)]
#[serde(rename_all = "camelCase")]
struct Summary {
    count: usize,
    sum: f64,
    mean: f64,
    computed_at: Time,
}

#[derive(Debug)]
struct DivisionByZero;

impl ErrorProvider for DivisionByZero {
    fn code(&self) -> i64 {
        -32000
    }

    fn message(&self) -> String {
        "Division by zero".to_string()
    }
}

/// Logs each call with its duration
struct Timing;

#[async_trait]
impl RpcMiddleware for Timing {
    async fn handle(&self, ctx: RpcContext, request: JsonRpcRequest, next: Next) -> MiddlewareResult {
        let method = request.method.clone();
        let started = Instant::now();
        let result = next.run(ctx, request).await;
        info!("{} finished in {:?}", method, started.elapsed());
        result
    }
}

/// Counts calls routed through the math group
struct CallCounter {
    calls: Arc<AtomicU64>,
}

#[async_trait]
impl RpcMiddleware for CallCounter {
    async fn handle(&self, ctx: RpcContext, request: JsonRpcRequest, next: Next) -> MiddlewareResult {
        let total = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("math call #{}: {}", total, request.method);
        next.run(ctx, request).await
    }
}

fn build_server(args: &Args) -> anyhow::Result<RpcServer> {
    let mut builder = RpcServer::builder().middleware(Arc::new(Timing));
    if let Some(limit) = args.max_batch_size {
        builder = builder.max_batch_size(limit);
    }
    let server = builder.build().context("invalid server configuration")?;

    let calls = Arc::new(AtomicU64::new(0));
    let math = server.group(
        "math.",
        [Arc::new(CallCounter {
            calls: calls.clone(),
        }) as Arc<dyn RpcMiddleware>],
    );

    register(&math, "add", |_ctx: RpcContext, p: Operands| async move {
        Ok::<_, HandlerError>(p.a + p.b)
    });
    register(&math, "subtract", |_ctx: RpcContext, p: Operands| async move {
        Ok::<_, HandlerError>(p.a - p.b)
    });
    register(&math, "multiply", |_ctx: RpcContext, p: Operands| async move {
        Ok::<_, HandlerError>(p.a * p.b)
    });
    register(&math, "divide", |_ctx: RpcContext, p: Operands| async move {
        if p.b == 0.0 {
            return Err(HandlerError::provided(&DivisionByZero));
        }
        Ok(p.a / p.b)
    });
    register(&math, "summarize", |_ctx: RpcContext, s: Series| async move {
        let count = s.values.len();
        let sum: f64 = s.values.iter().sum();
        Ok::<_, HandlerError>(Summary {
            count,
            sum,
            mean: sum / count as f64,
            computed_at: Time::now(),
        })
    });

    register(&server, "stats.calls", move |_ctx: RpcContext, _: ()| {
        let calls = calls.clone();
        async move { Ok::<_, HandlerError>(calls.load(Ordering::Relaxed)) }
    });

    Ok(server)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stdio_calculator=info,typed_rpc_server=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let server = build_server(&args)?;

    let mut stdout = tokio::io::stdout();
    if args.spec {
        let spec = server.spec_json().context("failed to render schema")?;
        stdout.write_all(spec.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        return Ok(());
    }

    info!("Serving {} methods on stdin/stdout", server.method_names().len());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let outcome = server.handle_payload(RpcContext::new(), line.as_bytes()).await;
        debug!("Outcome status {}", outcome.status());
        if let Some(body) = outcome.body().context("failed to encode reply")? {
            stdout.write_all(&body).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}
