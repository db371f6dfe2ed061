//! Legacy block-name rewrite table, carried over verbatim from the
//! analyzer this system replaces: old numeric training labels are
//! rewritten to the descriptive names used in current summaries.

pub fn rewrite_legacy_block_name(name: &str) -> &str {
    match name {
        "training 1" => "training 125",
        "training 2" => "training 150",
        "training 3" => "training 175",
        "training 4b" => "training 125/150",
        "training 5b" => "training 125/150/175",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_legacy_names_rewrite() {
        assert_eq!(rewrite_legacy_block_name("training 1"), "training 125");
        assert_eq!(rewrite_legacy_block_name("training 5b"), "training 125/150/175");
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(rewrite_legacy_block_name("custom block"), "custom block");
    }
}
