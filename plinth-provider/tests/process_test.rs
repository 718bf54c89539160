//! End-to-end tests for the provider binary.
//!
//! Each test launches the real `plinth-provider` executable the way a host
//! would, reads the handshake line from stdout, and drives it over JSON-RPC.

use anyhow::{anyhow, Result};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::HttpClientBuilder;
use jsonrpsee::rpc_params;
use plinth_plugin::{MAGIC_COOKIE_KEY as COOKIE_KEY, MAGIC_COOKIE_VALUE as COOKIE_VALUE};
use plinth_provider_core::{Diagnostic, ImportedResource, ProviderSchema};
use serde_json::{json, Value};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

const TIMEOUT: Duration = Duration::from_secs(20);

fn plugin_command(config_home: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_plinth-provider"));
    cmd.env_remove(COOKIE_KEY)
        .env_remove("PLUGIN_PROTOCOL_VERSIONS")
        .env("XDG_CONFIG_HOME", config_home.path())
        .env("HOME", config_home.path())
        .env("PLUGIN_MIN_PORT", "23000")
        .env("PLUGIN_MAX_PORT", "23999")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    cmd
}

/// Read the handshake line and return the announced address.
async fn read_handshake(child: &mut Child) -> Result<String> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout not piped"))?;
    let mut lines = BufReader::new(stdout).lines();

    let line = tokio::time::timeout(TIMEOUT, lines.next_line())
        .await??
        .ok_or_else(|| anyhow!("plugin exited before handshake"))?;

    let parts: Vec<&str> = line.split('|').collect();
    assert_eq!(parts.len(), 5, "malformed handshake: {}", line);
    assert_eq!(parts[0], "1");
    assert_eq!(parts[1], "1");
    assert_eq!(parts[2], "tcp");
    assert_eq!(parts[4], "jsonrpc");

    Ok(parts[3].to_string())
}

async fn wait_for_exit(child: &mut Child) -> Result<ExitStatus> {
    Ok(tokio::time::timeout(TIMEOUT, child.wait()).await??)
}

#[tokio::test]
async fn test_serves_until_host_shutdown_then_exits_zero() -> Result<()> {
    let config_home = TempDir::new()?;
    let work_dir = TempDir::new()?;

    let mut child = plugin_command(&config_home)
        .env(COOKIE_KEY, COOKIE_VALUE)
        .spawn()?;

    let addr = read_handshake(&mut child).await?;
    let client = HttpClientBuilder::default().build(format!("http://{}", addr))?;

    let schema: ProviderSchema = client.request("provider.get_schema", rpc_params![]).await?;
    assert!(schema.resource("local_file").is_some());

    // Still serving between requests
    assert!(child.try_wait()?.is_none());

    let diags: Vec<Diagnostic> = client
        .request(
            "provider.configure",
            rpc_params![json!({ "root_dir": work_dir.path().to_string_lossy() })],
        )
        .await?;
    assert!(diags.is_empty(), "{:?}", diags);

    let created: Value = client
        .request(
            "resource.create",
            rpc_params!["local_file", json!({ "filename": "out/greeting.txt", "content": "hello" })],
        )
        .await?;
    assert_eq!(created["content_length"], json!(5));
    assert_eq!(
        std::fs::read_to_string(work_dir.path().join("out/greeting.txt"))?,
        "hello"
    );

    let imported: Vec<ImportedResource> = client
        .request(
            "resource.import",
            rpc_params!["local_file", created["id"].as_str().unwrap_or_default()],
        )
        .await?;
    assert_eq!(imported[0].state["content"], json!("hello"));

    let _: () = client
        .request("resource.delete", rpc_params!["local_file", created])
        .await?;
    assert!(!work_dir.path().join("out/greeting.txt").exists());

    // The reply may race the listener closing; only the exit status matters.
    let _ = client.request::<(), _>("plugin.shutdown", rpc_params![]).await;

    let status = wait_for_exit(&mut child).await?;
    assert!(status.success(), "exit status: {:?}", status);
    Ok(())
}

#[cfg(unix)]
async fn assert_signal_exits_zero(signal: &str) -> Result<()> {
    let config_home = TempDir::new()?;
    let mut child = plugin_command(&config_home)
        .env(COOKIE_KEY, COOKIE_VALUE)
        .spawn()?;

    let addr = read_handshake(&mut child).await?;
    let client = HttpClientBuilder::default().build(format!("http://{}", addr))?;
    let _: ProviderSchema = client.request("provider.get_schema", rpc_params![]).await?;

    let pid = child.id().ok_or_else(|| anyhow!("plugin already exited"))?;
    let sent = Command::new("kill")
        .arg(format!("-{}", signal))
        .arg(pid.to_string())
        .status()
        .await?;
    assert!(sent.success(), "kill -{} failed", signal);

    let status = wait_for_exit(&mut child).await?;
    assert!(status.success(), "exit status after {}: {:?}", signal, status);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_interrupt_exits_zero() -> Result<()> {
    assert_signal_exits_zero("INT").await
}

#[cfg(unix)]
#[tokio::test]
async fn test_terminate_exits_zero() -> Result<()> {
    assert_signal_exits_zero("TERM").await
}

#[tokio::test]
async fn test_exits_nonzero_without_magic_cookie() -> Result<()> {
    let config_home = TempDir::new()?;
    let mut child = plugin_command(&config_home).spawn()?;

    let status = wait_for_exit(&mut child).await?;
    assert!(!status.success());

    let mut stdout = String::new();
    if let Some(out) = child.stdout.take() {
        let mut lines = BufReader::new(out).lines();
        while let Some(line) = lines.next_line().await? {
            stdout.push_str(&line);
        }
    }
    assert!(stdout.is_empty(), "unexpected handshake: {}", stdout);
    Ok(())
}

#[tokio::test]
async fn test_exits_nonzero_on_protocol_mismatch() -> Result<()> {
    let config_home = TempDir::new()?;
    let mut child = plugin_command(&config_home)
        .env(COOKIE_KEY, COOKIE_VALUE)
        .env("PLUGIN_PROTOCOL_VERSIONS", "41,42")
        .spawn()?;

    let status = wait_for_exit(&mut child).await?;
    assert!(!status.success());
    Ok(())
}
