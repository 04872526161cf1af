// docbackup/src/storage/http.rs
use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::info;
use url::Url;

use crate::errors::{AppError, Result};

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// File name an archive fetched from `url` is saved under.
pub(crate) fn file_name_from_url(url: &Url) -> Result<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| AppError::Config(format!("URL {} does not name a file", url)))
}

/// Downloads `url` into `dest_dir`, keeping the URL's last path segment as file name.
pub async fn fetch_url(url: &str, dest_dir: &Path) -> Result<PathBuf> {
    let parsed =
        Url::parse(url).map_err(|e| AppError::Config(format!("Invalid backup URL {}: {}", url, e)))?;
    let dest = dest_dir.join(file_name_from_url(&parsed)?);

    info!("Fetching {} to {}", parsed, dest.display());
    let response = reqwest::get(parsed.clone())
        .await
        .map_err(|e| AppError::Connection(format!("Failed to fetch {}: {}", parsed, e)))?;

    if response.status() == StatusCode::NOT_FOUND {
        return Err(AppError::NotFound(format!("Backup {} does not exist", parsed)));
    }
    let mut response = response
        .error_for_status()
        .map_err(|e| AppError::Connection(format!("Failed to fetch {}: {}", parsed, e)))?;

    let mut file = tokio::fs::File::create(&dest).await?;
    let mut total = 0usize;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| AppError::Connection(format!("Interrupted while fetching {}: {}", parsed, e)))?
    {
        file.write_all(&chunk).await?;
        total += chunk.len();
    }
    file.flush().await?;

    info!("✅ Fetched {} bytes from {}", total, parsed);
    Ok(dest)
}

/// Serves `files` (path -> body) over plain HTTP on a loopback port; every
/// other path answers 404. Returns the base URL.
#[cfg(test)]
pub(crate) async fn serve_files(files: Vec<(String, Vec<u8>)>) -> String {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let request = String::from_utf8_lossy(&request);
            let path = request.split_whitespace().nth(1).unwrap_or("/");
            let (status, body) = match files.iter().find(|(p, _)| p == path) {
                Some((_, body)) => ("200 OK", body.clone()),
                None => ("404 Not Found", b"missing".to_vec()),
            };
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/gzip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}", addr)
}
