//! CLI struct definitions for unitytool.
//!
//! All clap-derived types live here; dispatch logic lives in `main.rs`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "unitytool", version, about = "Auditable editing pipeline for a Unity-style asset tree")]
pub struct Cli {
    /// Print the final envelope to stderr, as JSON, once the command completes.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read-only inspection of a single asset or of where a GUID is used.
    Inspect(InspectCli),
    /// Reference-integrity and runtime-log validation.
    Validate(ValidateCli),
    /// Generate maintenance suggestions from a scan.
    Suggest(SuggestCli),
    /// Patch-plan lifecycle: hash, sign, attest, verify, apply.
    Patch(PatchCli),
    /// Render a previously-emitted envelope as a report.
    Report(ReportCli),
}

#[derive(Args, Debug)]
pub struct InspectCli {
    #[command(subcommand)]
    pub command: InspectCommand,
}

#[derive(Subcommand, Debug)]
pub enum InspectCommand {
    /// Enumerate a prefab variant's base chain and override entries.
    Variant {
        #[arg(long)]
        path: PathBuf,
    },
    /// Find every occurrence of a GUID (or `Assets/...` path) within a scope.
    WhereUsed {
        #[arg(long = "asset-or-guid")]
        asset_or_guid: String,
        #[arg(long)]
        scope: Option<PathBuf>,
        #[arg(long = "exclude")]
        exclude: Vec<String>,
        #[arg(long = "max-usages", default_value_t = 50)]
        max_usages: usize,
    },
}

#[derive(Args, Debug)]
pub struct ValidateCli {
    #[command(subcommand)]
    pub command: ValidateCommand,
}

#[derive(Subcommand, Debug)]
pub enum ValidateCommand {
    /// Scan a scope for broken GUID/fileID references.
    Refs {
        #[arg(long)]
        scope: PathBuf,
        #[arg(long)]
        details: bool,
        #[arg(long = "max-diagnostics", default_value_t = 50)]
        max_diagnostics: usize,
        #[arg(long = "exclude")]
        exclude: Vec<String>,
        #[arg(long = "ignore-guid")]
        ignore_guid: Vec<String>,
        #[arg(long = "ignore-guid-file")]
        ignore_guid_file: Option<PathBuf>,
    },
    /// Classify an engine runtime log and fail on critical findings.
    Runtime {
        #[arg(long)]
        scene: PathBuf,
        #[arg(long = "log-file")]
        log_file: Option<PathBuf>,
    },
    /// Dispatch a plan's ops through the bridge and check the response shape.
    BridgeSmoke {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long = "expect-failure")]
        expect_failure: bool,
        #[arg(long = "expected-code")]
        expected_code: Option<String>,
        #[arg(long = "expected-applied")]
        expected_applied: Option<usize>,
        #[arg(long = "expect-applied-from-plan")]
        expect_applied_from_plan: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct SuggestCli {
    #[command(subcommand)]
    pub command: SuggestCommand,
}

#[derive(Subcommand, Debug)]
pub enum SuggestCommand {
    /// Propose GUIDs worth adding to the ignore-guid list, from a scan.
    IgnoreGuids {
        #[arg(long)]
        scope: PathBuf,
        #[arg(long = "min-occurrences", default_value_t = 2)]
        min_occurrences: usize,
        #[arg(long = "max-items", default_value_t = 10)]
        max_items: usize,
        #[arg(long = "out-ignore-guid-file")]
        out_ignore_guid_file: Option<PathBuf>,
        #[arg(long = "out-ignore-guid-mode", value_enum, default_value_t = IgnoreGuidWriteMode::Append)]
        out_ignore_guid_mode: IgnoreGuidWriteMode,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum IgnoreGuidWriteMode {
    Replace,
    Append,
}

#[derive(Args, Debug)]
pub struct PatchCli {
    #[command(subcommand)]
    pub command: PatchCommand,
}

#[derive(Copy, Clone, Debug, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
pub enum PatchCommand {
    /// Print the plan's SHA-256 digest.
    Hash {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Sign the plan with an HMAC-SHA256 key.
    Sign {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        #[arg(long = "key-file")]
        key_file: Option<PathBuf>,
        #[arg(long = "key-env")]
        key_env: Option<String>,
    },
    /// Produce an attestation file (digest, optional signature, timestamp).
    Attest {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        unsigned: bool,
        #[arg(long = "key-file")]
        key_file: Option<PathBuf>,
        #[arg(long = "key-env")]
        key_env: Option<String>,
    },
    /// Check a plan's digest/signature/attestation against expectations.
    Verify {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        #[arg(long = "plan-sha256")]
        expected_sha256: Option<String>,
        #[arg(long = "plan-signature")]
        expected_signature: Option<String>,
        #[arg(long = "attestation-file")]
        attestation_file: Option<PathBuf>,
        #[arg(long = "key-file")]
        key_file: Option<PathBuf>,
        #[arg(long = "key-env")]
        key_env: Option<String>,
    },
    /// Run the gated apply pipeline against a plan's target.
    Apply {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long = "dry-run")]
        dry_run: bool,
        #[arg(long)]
        confirm: bool,
        #[arg(long = "out-report")]
        out_report: Option<PathBuf>,
        #[arg(long = "plan-sha256")]
        plan_sha256: Option<String>,
        #[arg(long = "plan-signature")]
        plan_signature: Option<String>,
        #[arg(long = "attestation-file")]
        attestation_file: Option<PathBuf>,
        #[arg(long = "key-file")]
        key_file: Option<PathBuf>,
        #[arg(long = "key-env")]
        key_env: Option<String>,
        #[arg(long)]
        scope: Option<PathBuf>,
        #[arg(long = "runtime-scene")]
        runtime_scene: Option<PathBuf>,
        #[arg(long = "change-reason")]
        change_reason: Option<String>,
        #[arg(long = "bridge-timeout-secs")]
        bridge_timeout_secs: Option<u64>,
    },
}

#[derive(Args, Debug)]
pub struct ReportCli {
    #[command(subcommand)]
    pub command: ReportCommand,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ReportFormatArg {
    Md,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// Render an envelope JSON file as Markdown or pretty JSON.
    Export {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum)]
        format: ReportFormatArg,
        #[arg(long)]
        out: PathBuf,
        #[arg(long = "md-max-usages")]
        md_max_usages: Option<usize>,
        #[arg(long = "md-omit-usages")]
        md_omit_usages: bool,
        #[arg(long = "md-max-steps")]
        md_max_steps: Option<usize>,
        #[arg(long = "md-omit-steps")]
        md_omit_steps: bool,
    },
}
