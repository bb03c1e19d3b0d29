//! Player identifiers from team rosters, and request chunking.

use serde_json::Value;

/// Roster slots whose members are fetched by the player poll.
pub const ROSTER_FIELDS: [&str; 2] = ["lineup", "rotation"];

/// Upper bound on identifiers per player request.
pub const MAX_CHUNK: usize = 100;

/// Collect player ids from every team's lineup and rotation.
///
/// Order follows the teams and slots as given; duplicates are kept (the
/// player endpoint tolerates them and the merge store absorbs repeats).
#[must_use]
pub fn player_ids(teams: &[Value]) -> Vec<String> {
    teams
        .iter()
        .flat_map(|team| {
            ROSTER_FIELDS
                .iter()
                .filter_map(move |field| team.get(*field).and_then(Value::as_array))
                .flatten()
        })
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

/// Split `ids` into ordered chunks of at most `size` (clamped to
/// `1..=MAX_CHUNK`).
#[must_use]
pub fn chunk_ids(ids: &[String], size: usize) -> Vec<&[String]> {
    ids.chunks(size.clamp(1, MAX_CHUNK)).collect()
}

/// Comma-joined query value for one chunk.
#[must_use]
pub fn join_ids(chunk: &[String]) -> String {
    chunk.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lineup_and_rotation_from_all_teams() {
        let teams = vec![
            json!({"id": "t1", "lineup": ["p1", "p2"], "rotation": ["p3"], "bench": ["p9"]}),
            json!({"id": "t2", "lineup": ["p4"], "rotation": ["p5", "p1"]}),
            json!({"id": "t3"}),
        ];
        let ids = player_ids(&teams);
        assert_eq!(ids, vec!["p1", "p2", "p3", "p4", "p5", "p1"]);
    }

    #[test]
    fn non_string_entries_are_ignored() {
        let teams = vec![json!({"lineup": ["p1", 7, null], "rotation": "p2"})];
        assert_eq!(player_ids(&teams), vec!["p1"]);
    }

    #[test]
    fn two_hundred_fifty_ids_make_three_chunks() {
        let ids: Vec<String> = (0..250).map(|i| format!("p{i}")).collect();
        let chunks = chunk_ids(&ids, MAX_CHUNK);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(chunks[2][0], "p200");
    }

    #[test]
    fn chunk_size_is_clamped() {
        let ids: Vec<String> = (0..201).map(|i| format!("p{i}")).collect();
        assert_eq!(chunk_ids(&ids, 500).len(), 3);
        assert_eq!(chunk_ids(&ids[..3], 0).len(), 3);
        assert!(chunk_ids(&[], 100).is_empty());
    }

    #[test]
    fn join_is_comma_separated() {
        let chunk = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(join_ids(&chunk), "a,b,c");
    }
}
