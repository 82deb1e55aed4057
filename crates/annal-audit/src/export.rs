//! Export and import of records.
//!
//! JSON Lines is the interchange format: one record per line, in id order.
//! A file written by [`write_jsonl`] reads back into records that verify
//! exactly like the originals.

use std::io::{BufRead, Write};

use crate::error::{AuditError, AuditResult};
use crate::record::AuditRecord;

/// Write records as JSON Lines. Returns the number written.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_jsonl<W: Write>(records: &[AuditRecord], mut out: W) -> AuditResult<usize> {
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(records.len())
}

/// Read JSON Lines. Blank lines are skipped.
///
/// # Errors
///
/// Returns [`AuditError::Serialization`] naming the 1-based line number of
/// the first malformed record, or an I/O error.
pub fn read_jsonl<R: BufRead>(input: R) -> AuditResult<Vec<AuditRecord>> {
    let mut records = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            AuditError::Serialization(format!("line {}: {e}", index.saturating_add(1)))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Write records as one pretty-printed JSON array.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json_array<W: Write>(records: &[AuditRecord], mut out: W) -> AuditResult<()> {
    serde_json::to_writer_pretty(&mut out, records)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_entry;
    use crate::record::{AuditAction, AuditDraft};
    use crate::schema::{StaticSettings, StoreCapabilities};
    use crate::storage::{AuditStore, KvAuditStore};
    use crate::value::{AuditMap, AuditValue};
    use crate::verify::{VerifyOptions, verify_records, verify_store};
    use crate::writer::AuditWriter;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn memory_writer() -> AuditWriter {
        AuditWriter::new(
            Arc::new(KvAuditStore::in_memory()),
            Arc::new(StaticSettings::default()),
        )
    }

    fn through_jsonl(records: &[AuditRecord]) -> Vec<AuditRecord> {
        let mut buf = Vec::new();
        write_jsonl(records, &mut buf).unwrap();
        read_jsonl(buf.as_slice()).unwrap()
    }

    fn records() -> Vec<AuditRecord> {
        let writer = memory_writer();
        writer
            .try_write(
                AuditDraft::new(AuditAction::Created, "user")
                    .with_change("score", 1.5, 2.0)
                    .with_change("tags", vec!["a"], vec!["a", "b"]),
            )
            .unwrap();
        writer
            .try_write(AuditDraft::new(AuditAction::custom("exported"), "report"))
            .unwrap();
        writer.store().all().unwrap()
    }

    #[test]
    fn test_jsonl_roundtrip_verifies() {
        let original = records();
        let mut buf = Vec::new();
        assert_eq!(write_jsonl(&original, &mut buf).unwrap(), 2);

        let text = String::from_utf8(buf.clone()).unwrap();
        assert_eq!(text.lines().count(), 2);

        let back = read_jsonl(buf.as_slice()).unwrap();
        assert_eq!(back, original);
        assert!(verify_records(&back, &VerifyOptions::default()).valid);
    }

    #[test]
    fn test_read_skips_blank_lines() {
        let mut buf = Vec::new();
        write_jsonl(&records(), &mut buf).unwrap();
        buf.extend_from_slice(b"\n   \n");
        assert_eq!(read_jsonl(buf.as_slice()).unwrap().len(), 2);
    }

    #[test]
    fn test_read_reports_line_number() {
        let mut buf = Vec::new();
        write_jsonl(&records()[..1], &mut buf).unwrap();
        buf.extend_from_slice(b"{not json}\n");
        let err = read_jsonl(buf.as_slice()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_json_array() {
        let mut buf = Vec::new();
        write_json_array(&records(), &mut buf).unwrap();
        let parsed: Vec<AuditRecord> = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    /// Finite doubles spread over the whole bit space.
    fn scattered_floats(count: usize) -> Vec<f64> {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut out = vec![971.986_371_854_762_9, 0.1, 1e-300, -0.0, 5e-324, f64::MAX];
        while out.len() < count {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let f = f64::from_bits(state);
            if f.is_finite() {
                out.push(f);
            }
        }
        out
    }

    #[test]
    fn test_float_values_keep_their_bits() {
        let writer = memory_writer();
        for (n, chunk) in scattered_floats(400).chunks(20).enumerate() {
            let values: AuditMap = chunk
                .iter()
                .enumerate()
                .map(|(i, f)| (format!("v{i:02}"), AuditValue::Float(*f)))
                .collect();
            writer
                .try_write(
                    AuditDraft::new(AuditAction::Updated, "measurement")
                        .with_subject_id(n.to_string())
                        .with_new_values(values),
                )
                .unwrap();
        }

        let store = writer.store();
        let report = verify_store(store.as_ref(), None).unwrap();
        assert!(report.valid, "{:?}", report.issues);

        let back = through_jsonl(&store.all().unwrap());
        assert_eq!(back.len(), 20);
        assert!(verify_records(&back, &VerifyOptions::default()).valid);
    }

    fn arb_value() -> impl Strategy<Value = AuditValue> {
        let leaf = prop_oneof![
            Just(AuditValue::Null),
            any::<bool>().prop_map(AuditValue::Bool),
            any::<i64>().prop_map(AuditValue::Int),
            any::<f64>()
                .prop_filter("finite", |f| f.is_finite())
                .prop_map(AuditValue::Float),
            ".{0,12}".prop_map(AuditValue::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(AuditValue::List),
                proptest::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                    .prop_map(AuditValue::Map),
            ]
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_stored_values_normalize_identically(
            values in proptest::collection::btree_map("[a-z_]{1,8}", arb_value(), 1..6)
        ) {
            let writer = memory_writer();
            let written = writer
                .try_write(AuditDraft::new(AuditAction::Created, "doc").with_new_values(values))
                .unwrap()
                .unwrap();
            let caps = StoreCapabilities::full();
            let expected = normalize_entry(&written.entry, &caps);

            let stored = writer.store().get(written.id).unwrap().unwrap();
            prop_assert_eq!(&normalize_entry(&stored.entry, &caps), &expected);

            let exported = through_jsonl(std::slice::from_ref(&stored));
            prop_assert_eq!(&normalize_entry(&exported[0].entry, &caps), &expected);
        }
    }
}
