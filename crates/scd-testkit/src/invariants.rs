use anyhow::{bail, Result};
use scd_reconcile::IntervalRecord;

/// Records must be ordered by `(key, valid_from)`, as stores return them.
pub fn check_no_overlap(records: &[IntervalRecord]) -> Result<()> {
    for w in records.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if a.key != b.key {
            continue;
        }
        if a.valid_from >= b.valid_from {
            bail!("records for {} not strictly ordered at {}", a.key, b.valid_from);
        }
        if a.overlaps(b) {
            bail!(
                "overlap for {}: [{}, {}) and [{}, {})",
                a.key,
                a.valid_from,
                a.valid_to,
                b.valid_from,
                b.valid_to
            );
        }
    }
    for r in records {
        if r.is_empty() {
            bail!("empty interval for {} at {}", r.key, r.valid_from);
        }
    }
    Ok(())
}

/// Two records of one key that touch never carry equal attributes.
pub fn check_no_adjacent_equal(records: &[IntervalRecord]) -> Result<()> {
    for w in records.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if a.key == b.key && a.valid_to.as_date() == Some(b.valid_from) && a.attributes == b.attributes {
            bail!(
                "adjacent records for {} at {} hold equal attributes",
                a.key,
                b.valid_from
            );
        }
    }
    Ok(())
}

pub fn check_invariants(records: &[IntervalRecord]) -> Result<()> {
    check_no_overlap(records)?;
    check_no_adjacent_equal(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::date;
    use scd_reconcile::{Attributes, Boundary, Key};

    fn rec(k: &str, a: &str, from: &str, to: Option<&str>) -> IntervalRecord {
        IntervalRecord::new(
            Key::new([k]),
            Attributes::of([a]),
            date(from),
            Boundary::from(to.map(date)),
        )
    }

    #[test]
    fn detects_overlap() {
        let rs = [
            rec("X", "A", "2025-12-01", Some("2025-12-05")),
            rec("X", "B", "2025-12-03", None),
        ];
        assert!(check_no_overlap(&rs).is_err());
    }

    #[test]
    fn detects_adjacent_equal() {
        let rs = [
            rec("X", "A", "2025-12-01", Some("2025-12-03")),
            rec("X", "A", "2025-12-03", None),
        ];
        assert!(check_no_overlap(&rs).is_ok());
        assert!(check_no_adjacent_equal(&rs).is_err());
    }

    #[test]
    fn gaps_and_other_keys_are_fine() {
        let rs = [
            rec("X", "A", "2025-12-01", Some("2025-12-03")),
            rec("X", "A", "2025-12-05", None),
            rec("Y", "A", "2025-12-01", None),
        ];
        assert!(check_invariants(&rs).is_ok());
    }
}
