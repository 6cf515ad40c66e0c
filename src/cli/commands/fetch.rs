//! Fetch command - obtain a binary and write it to disk

use crate::cli::args::FetchArgs;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{BinsmithError, BinsmithResult};
use crate::request::PackageRequest;
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> BinsmithResult<()> {
    let ctx = UiContext::detect();
    let request = PackageRequest::parse(
        &args.spec,
        args.os.as_deref().unwrap_or(&config.general.default_os),
        args.arch.as_deref().unwrap_or(&config.general.default_arch),
    )?;
    debug!("Parsed request: {}", request);

    let dispatcher = Dispatcher::from_config(config)?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Fetching {}", request));
    let artifact = match dispatcher.obtain_artifact(&request).await {
        Ok(artifact) => artifact,
        Err(e) => {
            spinner.stop_error(&format!("Failed to fetch {}", request.import_path));
            return Err(e.into());
        }
    };
    spinner.stop(&format!("Fetched {}", artifact.key));

    let output = args
        .output
        .unwrap_or_else(|| default_output(request.binary_name(), &request.os));
    write_executable(&output, &artifact.bytes).await?;

    ui::step_ok_detail(
        &ctx,
        &format!("Wrote {}", output.display()),
        &format!("{} bytes, sha256 {}", artifact.size, short_digest(&artifact.checksum)),
    );
    Ok(())
}

fn default_output(binary_name: &str, os: &str) -> PathBuf {
    if os == "windows" {
        PathBuf::from(format!("{}.exe", binary_name))
    } else {
        PathBuf::from(binary_name)
    }
}

fn short_digest(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

async fn write_executable(path: &Path, bytes: &[u8]) -> BinsmithResult<()> {
    fs::write(path, bytes)
        .await
        .map_err(|e| BinsmithError::io(format!("writing {}", path.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| BinsmithError::io(format!("making {} executable", path.display()), e))?;
    }

    Ok(())
}
