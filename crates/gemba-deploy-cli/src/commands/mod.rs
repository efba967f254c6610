mod deploy;
mod deploy_pipeline;

use gemba_deploy_core::config::{OPTIONAL_VARS, REQUIRED_VARS};

pub use deploy::deploy;

/// `--help` epilogue listing every configuration variable.
pub fn variables_help() -> String {
    let mut out = String::from("Required variables:\n");
    for name in REQUIRED_VARS {
        out.push_str(&format!("  {name}\n"));
    }
    out.push_str("\nOptional variables (default):\n");
    for (name, default) in OPTIONAL_VARS {
        out.push_str(&format!("  {name:<22} {default}\n"));
    }
    out.push_str(
        "\nValues are read from CONFIG (if given), then ./deploy.env (if present), \
         then the process environment.\n\
         In config files, single-quote secrets that contain `$` \
         (e.g. AZURE_SQL_ADMIN_PASSWORD='Pa$word9'); unquoted and double-quoted \
         values expand `$NAME`.",
    );
    out
}
