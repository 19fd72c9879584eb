//! wsrun CLI entry point

#![allow(clippy::print_stderr)]

use tokio_util::sync::CancellationToken;
use wsrun::cli::{self, EXIT_FAILURE, exit_code_for, render_error};
use wsrun::tracing::{TracingConfig, TracingFormat};
use wsrun::{commands, shutdown};

fn main() {
    // Tracing may be unusable while panicking
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with --level debug for more information.");
    }));

    let cli = cli::parse();
    let exit_code = run_with_tokio(cli);
    std::process::exit(exit_code);
}

fn run_with_tokio(cli: cli::Cli) -> i32 {
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            return EXIT_FAILURE;
        }
    };

    rt.block_on(run(cli))
}

async fn run(cli: cli::Cli) -> i32 {
    let tracing_config = TracingConfig {
        format: if cli.json {
            TracingFormat::Json
        } else {
            cli.log_format
        },
        level: cli.level.into(),
        ..Default::default()
    };
    if let Err(e) = wsrun::tracing::init_tracing(tracing_config) {
        eprintln!("{e:?}");
    }

    let cancel = CancellationToken::new();
    shutdown::install_signal_handlers(cancel.clone());

    let exit_code = match commands::execute(cli.command, &cancel).await {
        Ok(code) => code,
        Err(err) => {
            let code = exit_code_for(&err);
            render_error(err, cli.json);
            code
        }
    };
    cancel.cancel();
    exit_code
}
