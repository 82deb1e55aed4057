//! End-to-end behavior of the write path.

mod common;

use annal_audit::{
    AuditAction, AuditContext, AuditDraft, AuditSettings, AuditValue, Auditable, REDACTED,
    SigningKey, StoreCapabilities, VerifyOptions, hasher, verify_records,
};
use annal_telemetry::RequestContext;
use annal_test::{
    FailingStore, TEST_SECRET, TestUser, admin_context, fixed_time, sample_draft,
    signing_settings, test_settings, values,
};
use common::AuditHarness;
use serde_json::json;

#[test]
fn lifecycle_of_an_entity() {
    let harness = AuditHarness::new(test_settings());
    let ctx = admin_context();

    let mut user = TestUser::new(1, "Ada");
    user.ssn = Some("123-45-6789".into());
    harness.writer.write_audit(user.build_create_record(&ctx));

    let before = user.audit_snapshot();
    user.email = "ada@lovelace.dev".into();
    user.login_count = 10;
    let update = user.build_update_record(&before, &ctx).unwrap();
    harness.writer.write_audit(update);

    harness.writer.write_audit(user.build_delete_record(&ctx));
    harness.writer.write_audit(user.build_restore_record(&ctx));
    harness.writer.write_audit(user.build_force_delete_record(&ctx));

    let records = harness.records();
    let actions: Vec<_> = records.iter().map(|r| r.entry.action.as_str()).collect();
    assert_eq!(
        actions,
        ["created", "updated", "deleted", "restored", "force_deleted"]
    );

    let created = records[0].entry.new_values.as_ref().unwrap();
    assert_eq!(created["password"], AuditValue::from(REDACTED));
    assert_eq!(created["ssn"], AuditValue::from(REDACTED));
    assert!(!created.contains_key("login_count"));
    assert_eq!(records[0].entry.subject_label.as_deref(), Some("Ada"));
    assert_eq!(records[0].entry.actor_id.as_deref(), Some("admin"));

    let updated = records[1].entry.new_values.as_ref().unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated["email"], AuditValue::from("ada@lovelace.dev"));

    harness.assert_valid();
}

#[test]
fn configured_redaction_is_nested_and_case_insensitive() {
    let harness = AuditHarness::new(AuditSettings {
        redact_fields: vec!["IBAN".into()],
        ..test_settings()
    });
    let draft = AuditDraft::new(AuditAction::Updated, "account").with_new_values(values(json!({
        "billing": {"iban": "DE00", "Token": "t"},
        "history": [{"Password": "p"}],
    })));
    let record = harness.writer.try_write(draft).unwrap().unwrap();
    let new = AuditValue::Map(record.entry.new_values.unwrap()).to_json();

    assert_eq!(new["billing"]["iban"], REDACTED);
    assert_eq!(new["billing"]["Token"], REDACTED);
    assert_eq!(new["history"][0]["Password"], REDACTED);
}

#[test]
fn signing_can_be_toggled_between_writes() {
    let harness = AuditHarness::new(test_settings());
    harness.writer.write_audit(sample_draft(1));

    harness.settings.replace(signing_settings());
    harness.writer.schema().reset();
    harness.writer.write_audit(sample_draft(2));

    harness.settings.replace(test_settings());
    harness.writer.schema().reset();
    harness.writer.write_audit(sample_draft(3));

    let records = harness.records();
    let signed: Vec<bool> = records.iter().map(|r| r.signature.is_some()).collect();
    assert_eq!(signed, [false, true, false]);

    let key = SigningKey::new(TEST_SECRET).unwrap();
    assert!(hasher::verify_signature(
        &records[1].hash,
        records[1].signature.as_ref().unwrap(),
        &key
    ));
    let result = verify_records(&records, &VerifyOptions::default().with_signing_key(key));
    assert!(result.valid);
}

#[test]
fn settings_change_is_invisible_until_reset() {
    let harness = AuditHarness::new(test_settings());
    harness.writer.write_audit(sample_draft(1));

    harness.settings.replace(AuditSettings {
        enabled: false,
        ..test_settings()
    });
    harness.writer.write_audit(sample_draft(2));
    assert_eq!(harness.records().len(), 2);

    harness.writer.schema().reset();
    harness.writer.write_audit(sample_draft(3));
    assert_eq!(harness.records().len(), 2);
}

#[test]
fn minimal_store_signs_nothing_and_still_verifies() {
    let harness = AuditHarness::with_capabilities(signing_settings(), StoreCapabilities::minimal());
    let draft = sample_draft(1)
        .with_context(values(json!({"tenant": "acme"})))
        .at(fixed_time());
    let record = harness.writer.try_write(draft).unwrap().unwrap();

    assert!(record.signature.is_none());
    assert!(record.entry.context.is_none());
    assert_eq!(record.entry.created_at, fixed_time());
    harness.assert_valid();

    // The full field set hashes columns this store never had.
    let full = verify_records(&harness.records(), &VerifyOptions::default());
    assert!(!full.valid);
}

#[test]
fn missing_secret_is_reported_not_raised() {
    let harness = AuditHarness::new(AuditSettings {
        signing_enabled: true,
        ..test_settings()
    });
    harness.writer.write_audit(sample_draft(1));

    assert!(harness.records().is_empty());
    let reports = harness.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_configuration);
    assert_eq!(reports[0].failed.subject_id.as_deref(), Some("1"));
}

#[test]
fn storage_failure_is_reported_not_retried() {
    let harness = AuditHarness::with_store(test_settings(), FailingStore::new());
    harness.writer.write_audit(sample_draft(1));

    let reports = harness.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_storage);
    assert!(harness.writer.try_write(sample_draft(2)).is_err());
}

#[test]
fn panicking_store_does_not_escape() {
    let harness = AuditHarness::with_store(test_settings(), FailingStore::panicking());
    harness.writer.write_audit(sample_draft(1));
    assert_eq!(harness.reporter.count(), 1);
    assert!(harness.reporter.reports()[0].error.contains("panicked"));
}

#[test]
fn request_metadata_is_captured_and_hashed() {
    let harness = AuditHarness::new(test_settings());
    let request = RequestContext::new("http")
        .with_user_id("42")
        .with_session_id("sess-9")
        .with_client("203.0.113.7", "Mozilla/5.0")
        .with_http("PATCH", "https://admin.example/users/1", Some("users.update".into()));
    let ctx = AuditContext::from_request(&request);

    let user = TestUser::new(1, "Ada");
    let record = harness
        .writer
        .try_write(user.build_delete_record(&ctx))
        .unwrap()
        .unwrap();

    let meta = &record.entry.request;
    assert_eq!(record.entry.actor_id.as_deref(), Some("42"));
    assert_eq!(meta.request_id, Some(request.request_id.to_string()));
    assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.7"));
    assert_eq!(meta.route.as_deref(), Some("users.update"));
    assert!(meta.duration_ms.is_some());

    let mut tampered = harness.records();
    tampered[0].entry.request.ip_address = Some("198.51.100.1".into());
    assert!(!verify_records(&tampered, &harness.options()).valid);
}
