use serde::Deserialize;

/// What the session does when a driver call other than the bus attach fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Record the failure in the status ledger and carry on with the sequence.
    #[default]
    Accumulate,
    /// Abort the session on the first failing call.
    FailFast,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        policy: StatusPolicy,
    }

    #[test]
    fn policy_deserializes_from_snake_case() -> Result<(), toml::de::Error> {
        let accumulate: Wrapper = toml::from_str(r#"policy = "accumulate""#)?;
        let fail_fast: Wrapper = toml::from_str(r#"policy = "fail_fast""#)?;

        assert_eq!(accumulate.policy, StatusPolicy::Accumulate);
        assert_eq!(fail_fast.policy, StatusPolicy::FailFast);
        Ok(())
    }

    #[test]
    fn default_policy_accumulates() {
        assert_eq!(StatusPolicy::default(), StatusPolicy::Accumulate);
    }
}
