use std::path::Path;

use anyhow::{Context, Result};
use leapp_core::{read_plugin_data, CommandRunner};
use leapp_dnfplugin::{run_plugin, DnfCli, PluginCommand, PluginRun, TransactionOutcome};

use crate::render::{current_output_style, render_status_line, OutputStyle};

const SHELL_SCRIPT_NAME: &str = "dnf-shell-script.txt";

pub(crate) fn run_rhel_upgrade(
    runner: &dyn CommandRunner,
    command: PluginCommand,
    data_file: &Path,
) -> Result<()> {
    let data = read_plugin_data(data_file)
        .with_context(|| format!("failed to load plugin data: {}", data_file.display()))?;
    let mut base = DnfCli::new(runner, data_file.with_file_name(SHELL_SCRIPT_NAME));
    let run = run_plugin(&mut base, command, &data)
        .with_context(|| format!("rhel-upgrade {command} failed"))?;

    for line in plugin_report_lines(&run, current_output_style()) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn plugin_report_lines(run: &PluginRun, style: OutputStyle) -> Vec<String> {
    let mut lines = Vec::new();
    if !run.unknown_repos.is_empty() {
        lines.push(render_status_line(
            style,
            "warn",
            &format!(
                "ignored repositories not defined in the target userspace: {}",
                run.unknown_repos.join(", ")
            ),
        ));
    }

    let report = &run.report;
    for (what, specs) in [
        ("removal", &report.unmatched_remove),
        ("installation", &report.unmatched_install),
        ("upgrade", &report.unmatched_upgrade),
    ] {
        if !specs.is_empty() {
            lines.push(render_status_line(
                style,
                "warn",
                &format!("nothing matched for {what}: {}", specs.join(", ")),
            ));
        }
    }
    if report.local_rpms > 0 {
        lines.push(render_status_line(
            style,
            "info",
            &format!("{} local package(s) added to the transaction", report.local_rpms),
        ));
    }

    let summary = match run.outcome {
        TransactionOutcome::ResolvedOnly => "transaction check passed",
        TransactionOutcome::Downloaded => "transaction packages downloaded",
        TransactionOutcome::Applied => "upgrade transaction applied",
    };
    lines.push(render_status_line(style, "ok", summary));
    lines
}
