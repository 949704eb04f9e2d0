use eyre::Context;

use crate::git::repo::wrap_git_error;

/// Wrapper around the config values stored on disk for Git.
pub struct Config {
    inner: git2::Config,
}

impl From<git2::Config> for Config {
    fn from(config: git2::Config) -> Self {
        Config { inner: config }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Git repository config>")
    }
}

/// Trait used to make `Config::get` able to return multiple types.
pub trait GetConfigValue<V> {
    /// Get the given type of value from the config object.
    fn get_from_config(config: &Config, key: impl AsRef<str>) -> eyre::Result<Option<V>>;
}

fn lookup<V>(
    key: &str,
    kind: &str,
    result: Result<V, git2::Error>,
) -> eyre::Result<Option<V>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(err) => Err(wrap_git_error(err))
            .wrap_err_with(|| format!("Looking up {kind} value for config key: {key:?}")),
    }
}

impl GetConfigValue<String> for String {
    fn get_from_config(config: &Config, key: impl AsRef<str>) -> eyre::Result<Option<String>> {
        let key = key.as_ref();
        lookup(key, "string", config.inner.get_string(key))
    }
}

impl GetConfigValue<bool> for bool {
    fn get_from_config(config: &Config, key: impl AsRef<str>) -> eyre::Result<Option<bool>> {
        let key = key.as_ref();
        lookup(key, "bool", config.inner.get_bool(key))
    }
}

impl GetConfigValue<i64> for i64 {
    fn get_from_config(config: &Config, key: impl AsRef<str>) -> eyre::Result<Option<i64>> {
        let key = key.as_ref();
        lookup(key, "integer", config.inner.get_i64(key))
    }
}

impl Config {
    /// Get a config key of one of various possible types.
    pub fn get<V: GetConfigValue<V>, S: AsRef<str>>(&self, key: S) -> eyre::Result<Option<V>> {
        V::get_from_config(self, key)
    }

    /// Same as `get`, but uses a default value if the config key doesn't exist.
    pub fn get_or<V: GetConfigValue<V>, S: AsRef<str>>(
        &self,
        key: S,
        default: V,
    ) -> eyre::Result<V> {
        let result = self.get(key)?;
        Ok(result.unwrap_or(default))
    }

    /// Set a string value. Only used to prepare repositories in tests.
    pub fn set_str(&mut self, key: impl AsRef<str>, value: &str) -> eyre::Result<()> {
        self.inner
            .set_str(key.as_ref(), value)
            .map_err(wrap_git_error)
            .wrap_err_with(|| format!("Setting config key: {:?}", key.as_ref()))
    }

    /// Set an integer value. Only used to prepare repositories in tests.
    pub fn set_i64(&mut self, key: impl AsRef<str>, value: i64) -> eyre::Result<()> {
        self.inner
            .set_i64(key.as_ref(), value)
            .map_err(wrap_git_error)
            .wrap_err_with(|| format!("Setting config key: {:?}", key.as_ref()))
    }
}
