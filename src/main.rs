//! direct-upload 服务端程序。
//!
//! 通过认证的客户端以断点续传方式向各自的存储上传文件：
//! `HEAD /{file}` 查询已接收字节数，`PUT /{file}` 追加，
//! `POST /{file}` 关闭上传。`user` 子命令管理保护这些路由的
//! 用户凭据。

mod atomic;
mod auth;
mod background;
mod cli;
mod config;
mod error;
mod fs_repository;
mod http;
mod kv_repository;
mod locking;
mod logging;
mod manager;
mod repository;
mod storage;
mod tls;
mod upload;
mod user;
mod version;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use crate::background::spawn_background_tasks;
use crate::config::{Cli, Command, GlobalArgs, ServerArgs};
use crate::manager::CredentialManager;
use crate::repository::open_repository;
use crate::storage::FileStore;

shadow!(build);

#[tokio::main]
async fn main() -> ExitCode {
    let cli_args = Cli::parse();
    logging::init_logging(cli_args.global.verbose);

    match cli_args.command {
        Command::About => {
            println!("{}", version::about_text());
            ExitCode::SUCCESS
        }
        Command::Server(args) => match serve(&cli_args.global, args).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(error = %err, "server stopped");
                ExitCode::FAILURE
            }
        },
        Command::User(command) => {
            let (manager, _) = match build_manager(&cli_args.global) {
                Ok(parts) => parts,
                Err(err) => {
                    error!(error = %err, "cannot open credential store");
                    return ExitCode::FAILURE;
                }
            };
            match cli::run_user_command(&manager, command).await {
                Ok(output) => {
                    println!("{output}");
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    error!(error = %err, "user command failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn build_manager(
    global: &GlobalArgs,
) -> Result<(Arc<CredentialManager>, Arc<FileStore>), repository::RepositoryError> {
    let storage = Arc::new(FileStore::new(global.files.clone()));
    let repository = open_repository(global.backend, &global.files, &global.db)?;
    let manager = Arc::new(CredentialManager::new(
        repository,
        storage.clone(),
        global.hash_cost,
    ));
    Ok((manager, storage))
}

/// 启动 HTTP(S) 服务并阻塞直到关闭。
async fn serve(global: &GlobalArgs, args: ServerArgs) -> Result<(), std::io::Error> {
    let (manager, storage) = build_manager(global).map_err(std::io::Error::other)?;
    storage.ensure_root().await?;
    info!(root = ?storage.root_path(), backend = ?global.backend, "storage ready");

    let addr: SocketAddr = args
        .address
        .parse()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{err}")))?;
    let tls_config = tls::build_rustls_config(&args, addr.ip()).await?;
    let app = http::build_router(manager, storage.clone());
    let handle = Handle::new();

    spawn_background_tasks(storage);
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    let server = async {
        match tls_config {
            Some(tls_config) => {
                info!("🔒 Starting HTTPS server at {}", addr);
                axum_server::bind_rustls(addr, tls_config)
                    .handle(handle.clone())
                    .serve(service)
                    .await
            }
            None => {
                info!("🚀 Starting HTTP server at {}", addr);
                axum_server::bind(addr)
                    .handle(handle.clone())
                    .serve(service)
                    .await
            }
        }
    };

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle.clone()) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
