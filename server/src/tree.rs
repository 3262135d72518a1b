use std::cmp::Ordering;

use kernel::{DocumentRecord, RecordKind};

/// Orders the immediate children of a folder for display: optional
/// case-insensitive substring filter, folders before files, natural name
/// order within each group. The sort is stable.
#[must_use]
pub fn assemble(mut children: Vec<DocumentRecord>, search: Option<&str>) -> Vec<DocumentRecord> {
    if let Some(term) = search {
        let term = term.to_lowercase();
        if !term.is_empty() {
            children.retain(|record| record.name.to_lowercase().contains(&term));
        }
    }
    children.sort_by(compare);
    children
}

fn compare(a: &DocumentRecord, b: &DocumentRecord) -> Ordering {
    group_rank(a.kind)
        .cmp(&group_rank(b.kind))
        .then_with(|| natural_cmp(&a.name, &b.name))
}

fn group_rank(kind: RecordKind) -> u8 {
    match kind {
        RecordKind::Folder => 0,
        RecordKind::File => 1,
    }
}

/// Case-insensitive string comparison that treats embedded digit runs as
/// numbers, so "Doc2" sorts before "Doc10".
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ca = a.chars().peekable();
    let mut cb = b.chars().peekable();

    loop {
        match (ca.peek().copied(), cb.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                if x.is_ascii_digit() && y.is_ascii_digit() {
                    let run_a = digit_run(&mut ca);
                    let run_b = digit_run(&mut cb);
                    let ordering = compare_digit_runs(&run_a, &run_b);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                } else {
                    let lx = x.to_lowercase();
                    let ly = y.to_lowercase();
                    let ordering = lx.cmp(ly);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                    ca.next();
                    cb.next();
                }
            }
        }
    }
}

fn digit_run(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if c.is_ascii_digit() {
            run.push(c);
            chars.next();
        } else {
            break;
        }
    }
    run
}

/// Compares digit runs numerically without parsing, so arbitrarily long runs
/// cannot overflow: strip leading zeros, longer run wins, lexical tiebreak.
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kernel::{CommitState, Visibility};
    use rstest::rstest;

    fn record(id: i64, name: &str, kind: RecordKind) -> DocumentRecord {
        let now = Utc::now();
        DocumentRecord {
            id,
            name: name.to_owned(),
            kind,
            parent_id: None,
            path: name.to_owned(),
            owner: "alice".to_owned(),
            visibility: Visibility::Private,
            state: CommitState::Committed,
            size: None,
            blob_key: None,
            content_type: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[rstest]
    #[case("Doc2", "Doc10", Ordering::Less)]
    #[case("Doc10", "Doc2", Ordering::Greater)]
    #[case("Doc2", "Doc2", Ordering::Equal)]
    #[case("doc2", "Doc2", Ordering::Equal)]
    #[case("Doc002", "Doc2", Ordering::Equal)]
    #[case("file", "file2", Ordering::Less)]
    #[case("a10b2", "a10b10", Ordering::Less)]
    #[case("9", "10", Ordering::Less)]
    #[case("alpha", "beta", Ordering::Less)]
    #[case("99999999999999999999", "100000000000000000000", Ordering::Less)]
    #[trace]
    fn natural_cmp_cases(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        // Arrange

        // Act
        let ordering = natural_cmp(a, b);

        // Assert
        assert_eq!(ordering, expected);
    }

    #[test]
    fn folders_precede_files_and_names_sort_naturally() {
        // Arrange
        let children = vec![
            record(1, "Doc10", RecordKind::File),
            record(2, "zeta", RecordKind::Folder),
            record(3, "Doc2", RecordKind::File),
            record(4, "Archive2", RecordKind::Folder),
            record(5, "Archive10", RecordKind::Folder),
        ];

        // Act
        let ordered = assemble(children, None);

        // Assert
        let names: Vec<&str> = ordered.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Archive2", "Archive10", "zeta", "Doc2", "Doc10"]);
    }

    #[test]
    fn search_filter_is_case_insensitive_substring() {
        // Arrange
        let children = vec![
            record(1, "Rapport annuel.pdf", RecordKind::File),
            record(2, "photo.png", RecordKind::File),
            record(3, "RAPPORTS", RecordKind::Folder),
        ];

        // Act
        let filtered = assemble(children, Some("rapport"));

        // Assert
        let names: Vec<&str> = filtered.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["RAPPORTS", "Rapport annuel.pdf"]);
    }

    #[test]
    fn empty_search_keeps_everything() {
        // Arrange
        let children = vec![
            record(1, "a", RecordKind::File),
            record(2, "b", RecordKind::File),
        ];

        // Act
        let filtered = assemble(children, Some(""));

        // Assert
        assert_eq!(filtered.len(), 2);
    }
}
