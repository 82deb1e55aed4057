//! Audit command - inspect, verify, export and append to the audit log.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use annal_audit::{
    AuditAction, AuditContext, AuditDraft, AuditMap, AuditRecord, AuditStore, AuditValue,
    AuditWriter, ChainAnchor, ChainVerificationResult, ContentHash, SigningKey, StoreCapabilities,
    VerifyOptions, read_jsonl, verify_records, verify_store, write_json_array, write_jsonl,
};
use anyhow::Context as _;
use colored::Colorize;

use crate::theme::Theme;

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ExportFormat {
    /// One record per line.
    Jsonl,
    /// A single pretty-printed array.
    Json,
}

/// List records in id order.
pub(crate) fn list_records(store: &dyn AuditStore, from: u64, limit: usize) -> anyhow::Result<()> {
    let records = store.range(from, limit)?;

    if records.is_empty() {
        println!("{}", Theme::info("No audit records"));
        return Ok(());
    }

    println!("\n{}", Theme::header("Audit Records"));
    println!(
        "{:>6}  {:<19}  {:<14}  {:<24}  {:<10}  {}",
        "ID".dimmed(),
        "TIMESTAMP".dimmed(),
        "ACTION".dimmed(),
        "SUBJECT".dimmed(),
        "ACTOR".dimmed(),
        "HASH".dimmed()
    );
    println!("{}", Theme::separator());

    for record in &records {
        let entry = &record.entry;
        let subject = match &entry.subject_id {
            Some(id) => format!("{}#{id}", entry.subject_type),
            None => entry.subject_type.clone(),
        };
        println!(
            "{:>6}  {}  {:<14}  {:<24}  {:<10}  {}",
            record.id,
            Theme::timestamp(&entry.created_at),
            entry.action.as_str(),
            subject,
            entry.actor_id.as_deref().unwrap_or("-"),
            Theme::hash(&record.hash.to_hex())
        );
    }

    println!();
    Ok(())
}

/// Show one record in full.
pub(crate) fn show_record(store: &dyn AuditStore, id: u64, json: bool) -> anyhow::Result<()> {
    let Some(record) = store.get(id)? else {
        anyhow::bail!("no audit record with id {id}");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let entry = &record.entry;
    println!("\n{}", Theme::header(&format!("Audit Record {}", record.id)));
    println!("{}", Theme::kv("action", entry.action.as_str()));
    println!("{}", Theme::kv("subject", &entry.subject_type));
    if let Some(id) = &entry.subject_id {
        println!("{}", Theme::kv("subject id", id));
    }
    if let Some(label) = &entry.subject_label {
        println!("{}", Theme::kv("label", label));
    }
    println!("{}", Theme::kv("actor", entry.actor_id.as_deref().unwrap_or("-")));
    println!("{}", Theme::kv("created", &entry.created_at.to_rfc3339()));
    if let Some(request_id) = &entry.request.request_id {
        println!("{}", Theme::kv("request", request_id));
    }
    println!("{}", Theme::kv("hash", &record.hash.to_hex()));
    let previous = record
        .previous_hash
        .map_or_else(|| "genesis".to_owned(), |h| h.to_hex());
    println!("{}", Theme::kv("previous", &previous));
    if let Some(signature) = &record.signature {
        println!("{}", Theme::kv("signature", &signature.to_hex()));
    }

    print_values("Old values", entry.old_values.as_ref());
    print_values("New values", entry.new_values.as_ref());
    print_values("Context", entry.context.as_ref());
    println!();
    Ok(())
}

fn print_values(title: &str, values: Option<&AuditMap>) {
    let Some(values) = values else { return };
    println!("\n  {}", title.bold());
    for (key, value) in values {
        println!("    {key} = {}", value.to_json());
    }
}

/// Verify the whole store. Returns whether the chain is intact.
pub(crate) fn verify_chain(
    store: &dyn AuditStore,
    signing_key: Option<SigningKey>,
) -> anyhow::Result<bool> {
    let checks_signatures = signing_key.is_some();
    let result = verify_store(store, signing_key)?;
    print_result(&result, checks_signatures);
    Ok(result.valid)
}

/// Verify an exported JSON Lines file. Returns whether the chain is intact.
pub(crate) fn verify_file(
    path: &Path,
    after: Option<&str>,
    window: bool,
    minimal: bool,
    signing_key: Option<SigningKey>,
) -> anyhow::Result<bool> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let records = read_jsonl(BufReader::new(file))?;

    let options = file_options(after, window, minimal, signing_key)?;
    let checks_signatures = options.signing_key.is_some();
    let result = verify_records(&records, &options);

    println!(
        "{}",
        Theme::dimmed(&format!("{} records from {}", records.len(), path.display()))
    );
    print_result(&result, checks_signatures);
    Ok(result.valid)
}

fn file_options(
    after: Option<&str>,
    window: bool,
    minimal: bool,
    signing_key: Option<SigningKey>,
) -> anyhow::Result<VerifyOptions> {
    let anchor = match (after, window) {
        (Some(hex), _) => ChainAnchor::After(
            ContentHash::from_hex(hex).with_context(|| format!("invalid anchor hash '{hex}'"))?,
        ),
        (None, true) => ChainAnchor::Unknown,
        (None, false) => ChainAnchor::Genesis,
    };
    let capabilities = if minimal {
        StoreCapabilities::minimal()
    } else {
        StoreCapabilities::full()
    };
    Ok(VerifyOptions {
        anchor,
        capabilities,
        signing_key,
    })
}

fn print_result(result: &ChainVerificationResult, checks_signatures: bool) {
    if result.valid {
        println!(
            "{}",
            Theme::success(&format!(
                "Chain verified: {} records, no issues",
                result.records_verified
            ))
        );
    } else {
        println!(
            "{}",
            Theme::error(&format!(
                "Chain has {} issues across {} records:",
                result.issues.len(),
                result.records_verified
            ))
        );
        for issue in &result.issues {
            println!("  - {issue}");
        }
    }
    if !checks_signatures {
        println!(
            "{}",
            Theme::warning("No signing secret configured; signatures were not checked")
        );
    }
}

/// Show audit statistics.
pub(crate) fn show_stats(
    store: &dyn AuditStore,
    signing_key: Option<SigningKey>,
) -> anyhow::Result<()> {
    let records = store.all()?;
    let signed = records.iter().filter(|r| r.signature.is_some()).count();

    println!("\n{}", Theme::header("Audit Statistics"));
    println!("  Total records: {}", records.len());
    println!("  Signed records: {signed}");
    if let Some(last) = records.last() {
        println!("  Chain head: {} (record {})", last.hash.to_hex(), last.id);
        println!("  Last write: {}", last.entry.created_at.to_rfc3339());
    }
    if let Some(key) = &signing_key {
        println!("  Signing key: {}", key.fingerprint());
    }

    let mut by_action: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
    for record in &records {
        let count = by_action.entry(record.entry.action.as_str()).or_default();
        *count = count.saturating_add(1);
    }
    for (action, count) in &by_action {
        println!("    {action:<16} {count}");
    }

    let options = VerifyOptions {
        capabilities: store.capabilities(),
        signing_key,
        ..VerifyOptions::default()
    };
    let result = verify_records(&records, &options);
    if result.valid {
        println!("  Integrity: {}", "OK".green());
    } else {
        println!(
            "  Integrity: {} ({} issues, first at record {})",
            "ISSUES".red(),
            result.issues.len(),
            result.issues.first().map_or(0, annal_audit::ChainIssue::record_id)
        );
    }

    println!();
    Ok(())
}

/// Export every record to `output`, or stdout.
pub(crate) fn export_records(
    store: &dyn AuditStore,
    format: ExportFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let records = store.all()?;
    match output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            write_records(&records, format, BufWriter::new(file))?;
            eprintln!(
                "{}",
                Theme::success(&format!(
                    "Exported {} records to {}",
                    records.len(),
                    path.display()
                ))
            );
        },
        None => write_records(&records, format, std::io::stdout().lock())?,
    }
    Ok(())
}

fn write_records<W: Write>(
    records: &[AuditRecord],
    format: ExportFormat,
    out: W,
) -> anyhow::Result<()> {
    match format {
        ExportFormat::Jsonl => {
            write_jsonl(records, out)?;
        },
        ExportFormat::Json => write_json_array(records, out)?,
    }
    Ok(())
}

/// A manual entry appended from the command line.
#[derive(Debug, Default)]
pub(crate) struct ManualEntry {
    pub(crate) action: String,
    pub(crate) subject_type: String,
    pub(crate) subject_id: Option<String>,
    pub(crate) actor: Option<String>,
    pub(crate) label: Option<String>,
    /// `key=value` assignments recorded as new values.
    pub(crate) values: Vec<String>,
}

/// Append a manual entry through the regular write path.
pub(crate) fn record_entry(writer: &AuditWriter, entry: ManualEntry) -> anyhow::Result<()> {
    let draft = manual_draft(entry)?;
    match writer.try_write(draft)? {
        Some(record) => println!(
            "{}",
            Theme::success(&format!(
                "Recorded {} as record {} ({})",
                record.entry.action,
                record.id,
                Theme::hash(&record.hash.to_hex())
            ))
        ),
        None => println!("{}", Theme::warning("Auditing is disabled; nothing recorded")),
    }
    Ok(())
}

fn manual_draft(entry: ManualEntry) -> anyhow::Result<AuditDraft> {
    let mut ctx = AuditContext::console();
    if let Some(actor) = entry.actor {
        ctx = ctx.with_actor(actor);
    }

    let mut values = AuditMap::new();
    for assignment in &entry.values {
        let (key, value) = parse_assignment(assignment)?;
        values.insert(key, value);
    }

    let mut draft = ctx.stamp(AuditDraft::new(
        AuditAction::custom(&entry.action),
        entry.subject_type,
    ));
    if let Some(id) = entry.subject_id {
        draft = draft.with_subject_id(id);
    }
    if let Some(label) = entry.label {
        draft = draft.with_label(label);
    }
    if !values.is_empty() {
        draft = draft.with_new_values(values);
    }
    Ok(draft)
}

/// Parse `key=value`. The value is read as JSON when it parses, otherwise
/// as a plain string.
fn parse_assignment(assignment: &str) -> anyhow::Result<(String, AuditValue)> {
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{assignment}'"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("empty key in '{assignment}'");
    }
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .map_or_else(|_| AuditValue::from(raw), AuditValue::from_json);
    Ok((key.to_owned(), value))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use annal_audit::{AuditSettings, KvAuditStore, StaticSettings};

    use super::*;

    fn writer(settings: AuditSettings) -> AuditWriter {
        AuditWriter::new(
            Arc::new(KvAuditStore::in_memory()),
            Arc::new(StaticSettings::new(settings)),
        )
    }

    fn entry(values: &[&str]) -> ManualEntry {
        ManualEntry {
            action: "password_reset".into(),
            subject_type: "user".into(),
            subject_id: Some("42".into()),
            actor: Some("admin".into()),
            label: None,
            values: values.iter().map(|v| (*v).to_owned()).collect(),
        }
    }

    #[test]
    fn test_parse_assignment() {
        let (key, value) = parse_assignment("count=3").unwrap();
        assert_eq!(key, "count");
        assert_eq!(value, AuditValue::from(3_i64));

        let (_, value) = parse_assignment("name=Ada Lovelace").unwrap();
        assert_eq!(value, AuditValue::from("Ada Lovelace"));

        let (_, value) = parse_assignment("blank=").unwrap();
        assert_eq!(value, AuditValue::from(""));

        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn test_record_entry_goes_through_write_path() {
        let writer = writer(AuditSettings::default());
        record_entry(&writer, entry(&["password=hunter2", "name=Ada"])).unwrap();

        let records = writer.store().all().unwrap();
        assert_eq!(records.len(), 1);
        let entry = &records[0].entry;
        assert_eq!(entry.action, AuditAction::Custom("password_reset".into()));
        assert_eq!(entry.actor_id.as_deref(), Some("admin"));
        assert_eq!(entry.subject_label.as_deref(), Some("Ada"));

        let new = entry.new_values.as_ref().unwrap();
        assert_eq!(new["password"], AuditValue::from("[redacted]"));
        assert_eq!(
            entry.context.as_ref().unwrap()["source"],
            AuditValue::from("console")
        );
    }

    #[test]
    fn test_record_entry_disabled() {
        let writer = writer(AuditSettings {
            enabled: false,
            ..AuditSettings::default()
        });
        record_entry(&writer, entry(&[])).unwrap();
        assert_eq!(writer.store().count().unwrap(), 0);
    }

    #[test]
    fn test_record_entry_reports_missing_secret() {
        let writer = writer(AuditSettings {
            signing_enabled: true,
            ..AuditSettings::default()
        });
        assert!(record_entry(&writer, entry(&[])).is_err());
    }

    #[test]
    fn test_store_commands() {
        let writer = writer(AuditSettings::default());
        record_entry(&writer, entry(&["name=Ada"])).unwrap();
        record_entry(&writer, entry(&["name=Grace"])).unwrap();
        let store = writer.store().as_ref();

        list_records(store, 1, 10).unwrap();
        show_record(store, 2, false).unwrap();
        show_record(store, 2, true).unwrap();
        assert!(show_record(store, 99, false).is_err());
        show_stats(store, None).unwrap();
        assert!(verify_chain(store, None).unwrap());
    }

    #[test]
    fn test_export_then_verify_file() {
        let writer = writer(AuditSettings::default());
        for name in ["Ada", "Grace", "Hedy"] {
            record_entry(&writer, entry(&[&format!("name={name}")])).unwrap();
        }
        let store = writer.store().as_ref();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        export_records(store, ExportFormat::Jsonl, Some(&path)).unwrap();
        assert!(verify_file(&path, None, false, false, None).unwrap());

        let text = std::fs::read_to_string(&path).unwrap();
        let tail: Vec<&str> = text.lines().skip(1).collect();
        let window = dir.path().join("window.jsonl");
        std::fs::write(&window, tail.join("\n")).unwrap();

        assert!(!verify_file(&window, None, false, false, None).unwrap());
        assert!(verify_file(&window, None, true, false, None).unwrap());

        let first = store.get(1).unwrap().unwrap();
        let anchor = first.hash.to_hex();
        assert!(verify_file(&window, Some(&anchor), false, false, None).unwrap());
    }

    #[test]
    fn test_file_options() {
        let options = file_options(None, false, true, None).unwrap();
        assert_eq!(options.anchor, ChainAnchor::Genesis);
        assert_eq!(options.capabilities, StoreCapabilities::minimal());

        assert!(file_options(Some("zz"), false, false, None).is_err());
    }
}
