use std::process::ExitCode;

use pagefault_host::{Modprobe, TdpConfig, disable_tdp};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    info!("kvm_pagefault01: CVE-2021-38198, fixed by KVM commit b1bd5cba3306");

    let config = TdpConfig::from_env();
    match disable_tdp(&config, &mut Modprobe) {
        Ok(report) => {
            if report.reloaded.is_empty() {
                info!("no KVM module had two-dimensional paging enabled");
            } else {
                info!("reloaded {:?}, KVM now uses the shadow MMU", report.reloaded);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
