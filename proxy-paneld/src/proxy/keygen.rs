use std::path::PathBuf;
use std::process::Stdio;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use crate::collaborators::KeyGenerator;
use crate::config::ProxyConfig;

/// Generates key material with the proxy binary's own subcommands.
pub struct BinaryKeyGenerator {
    binary: PathBuf,
}

impl BinaryKeyGenerator {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            binary: config.binary.clone(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", args.join(" "), output.status, stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Values of `Label: value` lines, in order
fn labelled_values(output: &str) -> Vec<&str> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .collect()
}

/// First two labelled values, named `first` and `second`
fn pair(output: &str, command: &str, first: &str, second: &str) -> Result<Value> {
    match labelled_values(output).as_slice() {
        [a, b, ..] => Ok(json!({ first: a, second: b })),
        _ => bail!("Unexpected output from {}: {}", command, output.trim()),
    }
}

/// The non-empty line following the line `heading`
fn value_after<'a>(output: &'a str, heading: &str) -> Option<&'a str> {
    let mut lines = output.lines().map(str::trim);
    lines.find(|line| *line == heading)?;
    lines.find(|line| !line.is_empty())
}

/// `Authentication: <label>` blocks, each followed by quoted decryption/encryption lines
fn parse_vless_enc(output: &str) -> Result<Value> {
    let mut auths: Vec<serde_json::Map<String, Value>> = Vec::new();

    for line in output.lines().map(str::trim) {
        if let Some(label) = line.strip_prefix("Authentication:") {
            let mut auth = serde_json::Map::new();
            auth.insert("label".to_string(), Value::from(label.trim()));
            auths.push(auth);
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_matches('"');
        if key != "decryption" && key != "encryption" {
            continue;
        }
        let value = value.trim().trim_end_matches(',').trim_matches('"');
        if let Some(auth) = auths.last_mut() {
            auth.insert(key.to_string(), Value::from(value));
        }
    }

    if auths.is_empty() {
        bail!("Unexpected output from vlessenc: {}", output.trim());
    }
    Ok(json!({ "auths": auths }))
}

#[async_trait]
impl KeyGenerator for BinaryKeyGenerator {
    async fn x25519(&self) -> Result<Value> {
        let output = self.run(&["x25519"]).await?;
        pair(&output, "x25519", "privateKey", "publicKey")
    }

    async fn mldsa65(&self) -> Result<Value> {
        let output = self.run(&["mldsa65"]).await?;
        pair(&output, "mldsa65", "seed", "verify")
    }

    async fn ech_cert(&self, sni: &str) -> Result<Value> {
        let output = self.run(&["tls", "ech", "--serverName", sni]).await?;

        let config_list = value_after(&output, "ECH config list:");
        let server_keys = value_after(&output, "ECH server keys:");
        match (config_list, server_keys) {
            (Some(config_list), Some(server_keys)) => Ok(json!({
                "echConfigList": config_list,
                "echServerKeys": server_keys,
            })),
            _ => bail!("Unexpected output from tls ech: {}", output.trim()),
        }
    }

    async fn vless_enc(&self) -> Result<Value> {
        let output = self.run(&["vlessenc"]).await?;
        parse_vless_enc(&output)
    }
}
