//! Renders retrieved profile records into a single prompt context.

use profilesynth_shared::ProfileRecord;

/// Join records into labeled blocks separated by a blank line.
///
/// The whole profile is forwarded as-is: nothing is truncated or deduplicated.
pub fn assemble_context(records: &[ProfileRecord]) -> String {
    records
        .iter()
        .map(|r| format!("Source: {}\nContent:\n{}", r.source_collection, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use profilesynth_shared::Metadata;

    fn record(collection: &str, content: &str) -> ProfileRecord {
        ProfileRecord {
            source_collection: collection.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn renders_labeled_blocks() {
        let context = assemble_context(&[
            record("students_info", "Name: Ana Reyes"),
            record("students_grades", "Math: 1.25"),
        ]);
        assert_eq!(
            context,
            "Source: students_info\nContent:\nName: Ana Reyes\n\n\
             Source: students_grades\nContent:\nMath: 1.25"
        );
    }

    #[test]
    fn every_content_appears_once_in_order() {
        let records: Vec<_> = (0..5)
            .map(|i| record("students_info", &format!("unique-fragment-{i}")))
            .collect();
        let context = assemble_context(&records);

        let mut cursor = 0;
        for r in &records {
            assert_eq!(context.matches(&r.content).count(), 1);
            let at = context[cursor..].find(&r.content).expect("in order");
            cursor += at + r.content.len();
        }
    }

    #[test]
    fn duplicates_and_long_content_are_kept() {
        let long = "x".repeat(50_000);
        let context = assemble_context(&[
            record("students_info", &long),
            record("students_info", &long),
        ]);
        assert_eq!(context.matches(&long).count(), 2);
    }

    #[test]
    fn empty_input_renders_empty_string() {
        assert_eq!(assemble_context(&[]), "");
    }
}
