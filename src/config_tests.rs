// src/config_tests.rs

#[cfg(test)]
mod tests {
    use std::env;
    use std::sync::{Mutex, MutexGuard};

    use crate::config::{
        resolve_credentials, ConfigError, ENV_COMPANY, ENV_PASSWORD, ENV_USERNAME, ENV_USERS,
    };

    // Environment variables are process-global, so every test that touches
    // them holds this lock for its whole body.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn clear_env() {
        env::remove_var(ENV_USERS);
        env::remove_var(ENV_COMPANY);
        env::remove_var(ENV_USERNAME);
        env::remove_var(ENV_PASSWORD);
    }

    fn set_single_user_vars() {
        env::set_var(ENV_COMPANY, "11447");
        env::set_var(ENV_USERNAME, "5");
        env::set_var(ENV_PASSWORD, "secret");
    }

    #[test]
    fn test_multi_user_config_preserves_order_and_wins_over_single_vars() {
        let _guard = lock_env();
        clear_env();
        set_single_user_vars();
        env::set_var(
            ENV_USERS,
            r#"[{"company": "11447", "username": "5", "password": "a"},
                {"company": "11447", "username": "6", "password": "b"},
                {"company": "11447", "username": "5", "password": "a"}]"#,
        );

        let records = resolve_credentials().unwrap();

        assert_eq!(records.len(), 3, "no deduplication, duplicates included");
        let usernames: Vec<&str> = records.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(usernames, vec!["5", "6", "5"], "input order preserved");

        clear_env();
    }

    #[test]
    fn test_malformed_users_json_is_fatal_with_no_fallback() {
        let _guard = lock_env();
        clear_env();
        // A perfectly usable single-user config is present, but the explicit
        // multi-user value is broken: this must fail, not degrade.
        set_single_user_vars();
        env::set_var(ENV_USERS, "[{not json");

        let err = resolve_credentials().expect_err("malformed TIMEWATCH_USERS must be fatal");
        assert!(
            matches!(err, ConfigError::InvalidUsersJson(_)),
            "unexpected error: {}",
            err
        );

        clear_env();
    }

    #[test]
    fn test_record_with_missing_field_parses_but_is_incomplete() {
        let _guard = lock_env();
        clear_env();
        env::set_var(
            ENV_USERS,
            r#"[{"company": "11447", "username": "5", "password": "a"},
                {"company": "11447", "username": "6"}]"#,
        );

        let records = resolve_credentials().unwrap();

        assert_eq!(records.len(), 2, "incomplete records stay in the sequence");
        assert!(records[0].is_complete());
        assert!(
            !records[1].is_complete(),
            "a record without a password is skippable, not fatal"
        );

        clear_env();
    }

    #[test]
    fn test_single_user_fallback() {
        let _guard = lock_env();
        clear_env();
        set_single_user_vars();

        let records = resolve_credentials().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].company, "11447");
        assert_eq!(records[0].username, "5");
        assert_eq!(records[0].password, "secret");

        clear_env();
    }

    #[test]
    fn test_empty_users_value_falls_back_to_single_vars() {
        let _guard = lock_env();
        clear_env();
        env::set_var(ENV_USERS, "");
        set_single_user_vars();

        let records = resolve_credentials().unwrap();
        assert_eq!(records.len(), 1);

        clear_env();
    }

    #[test]
    fn test_no_configuration_at_all_is_fatal() {
        let _guard = lock_env();
        clear_env();

        let err = resolve_credentials().expect_err("no usable records must be fatal");
        assert!(matches!(err, ConfigError::MissingCredentials));
    }

    #[test]
    fn test_partial_single_user_config_is_fatal() {
        let _guard = lock_env();
        clear_env();
        env::set_var(ENV_COMPANY, "11447");
        env::set_var(ENV_USERNAME, "5");
        // No password.

        let err = resolve_credentials().expect_err("two of three single-user vars is not usable");
        assert!(matches!(err, ConfigError::MissingCredentials));

        clear_env();
    }
}
