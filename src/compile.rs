use std::path::Path;
use std::time::Duration;

use actix_web::{web, HttpResponse};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::Config;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    pub source: String,
    #[serde(default)]
    pub assets: Vec<CompileAsset>,
}

#[derive(Debug, Deserialize)]
pub struct CompileAsset {
    pub name: String,
    pub data_base64: String,
}

/// Compile LaTeX source with the external typesetting binary inside a scoped
/// temp directory. The directory is released on every path (the guard drops
/// even on timeout), and the subprocess is bounded by the configured timeout.
///
/// Failures come back as a 422 with a short diagnostic excerpt plus the full
/// log, never as a raw fault.
pub async fn compile_latex(
    config: web::Data<Config>,
    body: web::Json<CompileRequest>,
) -> Result<HttpResponse, ApiError> {
    let workdir = tempfile::Builder::new()
        .prefix("violeta_")
        .tempdir()
        .map_err(|e| {
            log::error!("could not create compile workdir: {}", e);
            ApiError::Internal
        })?;

    let tex_path = workdir.path().join("document.tex");
    tokio::fs::write(&tex_path, body.source.as_bytes())
        .await
        .map_err(|e| {
            log::error!("could not write tex source: {}", e);
            ApiError::Internal
        })?;

    for asset in &body.assets {
        // Only the basename: uploaded names must not escape the workdir.
        let name = match Path::new(&asset.name).file_name() {
            Some(name) => name.to_owned(),
            None => continue,
        };
        let bytes = BASE64
            .decode(&asset.data_base64)
            .map_err(|_| ApiError::Validation(format!("Invalid base64 for asset {}", asset.name)))?;
        tokio::fs::write(workdir.path().join(name), bytes)
            .await
            .map_err(|e| {
                log::error!("could not write compile asset: {}", e);
                ApiError::Internal
            })?;
    }

    let run = Command::new(&config.typeset_bin)
        .arg("document.tex")
        .current_dir(workdir.path())
        .kill_on_drop(true)
        .output();

    let output = match timeout(Duration::from_secs(config.compile_timeout_secs), run).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            log::warn!("could not run {}: {}", config.typeset_bin, e);
            return Ok(compile_failure("Typesetting binary unavailable", ""));
        }
        Err(_) => {
            log::warn!("compile timed out after {}s", config.compile_timeout_secs);
            return Ok(compile_failure("Compilation timed out", ""));
        }
    };

    let mut log_text = String::from_utf8_lossy(&output.stdout).into_owned();
    log_text.push_str(&String::from_utf8_lossy(&output.stderr));

    let pdf_path = workdir.path().join("document.pdf");
    if !output.status.success() || !pdf_path.exists() {
        return Ok(compile_failure(&extract_error(&log_text), &log_text));
    }

    let pdf_bytes = tokio::fs::read(&pdf_path).await.map_err(|e| {
        log::error!("could not read compiled pdf: {}", e);
        ApiError::Internal
    })?;

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .body(pdf_bytes))
}

fn compile_failure(error: &str, log_text: &str) -> HttpResponse {
    HttpResponse::UnprocessableEntity().json(serde_json::json!({
        "error": error,
        "log": log_text,
    }))
}

/// Pull a short diagnostic out of the compiler log: the first few lines that
/// look like errors, not the raw firehose.
fn extract_error(log_text: &str) -> String {
    let error_lines: Vec<&str> = log_text
        .lines()
        .filter(|l| l.starts_with("error:") || l.starts_with('!'))
        .take(5)
        .collect();
    if error_lines.is_empty() {
        "Compilation failed".to_string()
    } else {
        error_lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_picks_error_lines() {
        let log = "some noise\nerror: Undefined control sequence\n! Emergency stop.\nmore noise";
        let extracted = extract_error(log);
        assert_eq!(
            extracted,
            "error: Undefined control sequence\n! Emergency stop."
        );
    }

    #[test]
    fn test_extract_error_caps_at_five_lines() {
        let log = (0..10)
            .map(|i| format!("error: {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(extract_error(&log).lines().count(), 5);
    }

    #[test]
    fn test_extract_error_fallback() {
        assert_eq!(extract_error("nothing useful"), "Compilation failed");
    }
}
