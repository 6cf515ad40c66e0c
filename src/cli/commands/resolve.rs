//! Resolve command - show the concrete version a spec maps to

use crate::cli::args::ResolveArgs;
use crate::config::Config;
use crate::error::{BinsmithResult, DispatchError};
use crate::request::PackageRequest;
use crate::resolver::{GitHubResolver, Resolver};
use crate::ui::{self, UiContext};

/// Execute the resolve command
pub async fn execute(args: ResolveArgs, config: &Config) -> BinsmithResult<()> {
    let ctx = UiContext::detect();
    let request = PackageRequest::parse(
        &args.spec,
        &config.general.default_os,
        &config.general.default_arch,
    )?;

    let resolver = GitHubResolver::new(&config.resolver);
    let resolved = resolver
        .resolve(&request.import_path, &request.version)
        .await
        .map_err(DispatchError::from)?;
    let key = request.key_for(&resolved.version);

    if args.json {
        let value = serde_json::json!({
            "package": request.import_path.to_string(),
            "constraint": request.version.to_string(),
            "version": resolved.version,
            "archive_url": resolved.archive_url,
            "object": key.object_path(),
            "resolved_at": resolved.resolved_at,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    ui::section(&ctx, &request.import_path.to_string());
    ui::key_value(&ctx, "constraint", &request.version.to_string());
    ui::key_value(&ctx, "version", &resolved.version);
    ui::key_value(&ctx, "archive", &resolved.archive_url);
    ui::key_value(&ctx, "object", &key.object_path());
    Ok(())
}
