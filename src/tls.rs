//! TLS 配置：使用命令行指定的 PEM 文件或生成自签名证书。

use axum_server::tls_rustls::RustlsConfig;
use rcgen::generate_simple_self_signed;
use std::io;
use std::net::IpAddr;
use tracing::info;

use crate::config::ServerArgs;

/// 使用普通 HTTP 时返回 `None`。
pub async fn build_rustls_config(
    args: &ServerArgs,
    host: IpAddr,
) -> Result<Option<RustlsConfig>, io::Error> {
    match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => {
            info!(cert = ?cert, key = ?key, "loading tls certificate");
            Ok(Some(RustlsConfig::from_pem_file(cert, key).await?))
        }
        (None, None) if args.self_signed => {
            let (cert, key) = generate_self_signed(host)?;
            Ok(Some(RustlsConfig::from_pem(cert, key).await?))
        }
        (None, None) => Ok(None),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "both --cert and --key are required for tls",
        )),
    }
}

/// 为 `host` 生成内存中的 PEM 自签名证书。
fn generate_self_signed(host: IpAddr) -> Result<(Vec<u8>, Vec<u8>), io::Error> {
    let mut names = vec![host.to_string()];
    if host.is_unspecified() {
        names.push("localhost".to_string());
    }
    let certified = generate_simple_self_signed(names)
        .map_err(|err| io::Error::other(err.to_string()))?;
    info!(%host, "generated self-signed certificate");
    Ok((
        certified.cert.pem().into_bytes(),
        certified.key_pair.serialize_pem().into_bytes(),
    ))
}
