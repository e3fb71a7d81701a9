use crate::config::snippets;
use failure::{Fallible, ResultExt};
use std::path::{Path, PathBuf};

/// Runtime configuration holding environmental inputs.
#[derive(Debug, Serialize)]
pub(crate) struct ConfigInput {
    pub(crate) main: MainInput,
    pub(crate) broker: BrokerInput,
}

impl ConfigInput {
    /// Read the main config file plus its drop-in snippets, and merge them.
    pub(crate) fn read_config(path: &Path) -> Fallible<Self> {
        let mut snips = vec![read_snippet(path)?];
        for dropin in dropin_paths(path)? {
            snips.push(read_snippet(&dropin)?);
        }

        let cfg = Self::merge_snippets(snips);
        debug!(
            "configuration input:\n{}",
            toml::to_string_pretty(&cfg).context("failed to render configuration input")?
        );

        Ok(cfg)
    }

    /// Merge multiple snippets into a single configuration.
    pub(crate) fn merge_snippets(snippets: Vec<snippets::ConfigSnippet>) -> Self {
        let mut mains = vec![];
        let mut brokers = vec![];

        for snip in snippets {
            if let Some(m) = snip.main {
                mains.push(m);
            }
            if let Some(b) = snip.broker {
                brokers.push(b);
            }
        }

        Self {
            main: MainInput::from_snippets(mains),
            broker: BrokerInput::from_snippets(brokers),
        }
    }
}

/// Parse a single TOML snippet from `path`.
fn read_snippet(path: &Path) -> Fallible<snippets::ConfigSnippet> {
    use std::io::Read;
    trace!("reading config snippet from {:?}", path);

    let fp = std::fs::File::open(path)
        .context(format!("failed to open file '{}'", path.display()))?;
    let mut bufrd = std::io::BufReader::new(fp);
    let mut content = vec![];
    bufrd
        .read_to_end(&mut content)
        .context("failed to read file content")?;
    let snippet = toml::from_slice(&content)
        .context(format!("failed to parse TOML in '{}'", path.display()))?;

    Ok(snippet)
}

/// List `*.toml` files in the `<path>.d` drop-in directory, in lexical order.
fn dropin_paths(path: &Path) -> Fallible<Vec<PathBuf>> {
    let mut dir = path.as_os_str().to_owned();
    dir.push(".d");
    let dir = PathBuf::from(dir);
    if !dir.is_dir() {
        return Ok(vec![]);
    }

    let mut paths = vec![];
    let entries =
        std::fs::read_dir(&dir).context(format!("failed to read '{}'", dir.display()))?;
    for entry in entries {
        let p = entry.context("failed to read directory entry")?.path();
        if p.is_file() && p.extension().map_or(false, |ext| ext == "toml") {
            paths.push(p);
        }
    }
    paths.sort();

    Ok(paths)
}

#[derive(Debug, Serialize)]
pub(crate) struct MainInput {
    pub(crate) time_period: i64,
    pub(crate) hostname: String,
    pub(crate) overlap: String,
    pub(crate) active_tick_ms: u64,
    pub(crate) idle_tick_ms: u64,
}

impl MainInput {
    fn from_snippets(snippets: Vec<snippets::MainSnippet>) -> Self {
        let mut cfg = Self {
            time_period: 0,
            hostname: String::new(),
            overlap: String::new(),
            active_tick_ms: 0,
            idle_tick_ms: 0,
        };

        for snip in snippets {
            if let Some(tp) = snip.time_period {
                cfg.time_period = tp;
            }
            if let Some(h) = snip.hostname {
                cfg.hostname = h;
            }
            if let Some(o) = snip.overlap {
                cfg.overlap = o;
            }
            if let Some(t) = snip.active_tick_ms {
                cfg.active_tick_ms = t;
            }
            if let Some(t) = snip.idle_tick_ms {
                cfg.idle_tick_ms = t;
            }
        }

        cfg
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct BrokerInput {
    pub(crate) host: String,
    pub(crate) port: i64,
    pub(crate) vhost: String,
    pub(crate) queue: String,
    pub(crate) user: String,
    #[serde(skip_serializing)]
    pub(crate) pass: String,
    pub(crate) exchange: String,
}

impl BrokerInput {
    fn from_snippets(snippets: Vec<snippets::BrokerSnippet>) -> Self {
        let mut cfg = Self {
            host: String::new(),
            port: 0,
            vhost: String::new(),
            queue: String::new(),
            user: String::new(),
            pass: String::new(),
            exchange: String::new(),
        };

        for snip in snippets {
            if let Some(h) = snip.host {
                cfg.host = h;
            }
            if let Some(p) = snip.port {
                cfg.port = p;
            }
            if let Some(v) = snip.vhost {
                cfg.vhost = v;
            }
            if let Some(q) = snip.queue {
                cfg.queue = q;
            }
            if let Some(u) = snip.user {
                cfg.user = u;
            }
            if let Some(p) = snip.pass {
                cfg.pass = p;
            }
            if let Some(e) = snip.exchange {
                cfg.exchange = e;
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn later_snippets_override_earlier_ones() {
        let first: snippets::ConfigSnippet = toml::from_str(
            r#"
            [Main]
            TimePeriod = 60
            [RabbitMQ]
            Host = "mq1"
            Queue = "updates"
            "#,
        )
        .unwrap();
        let second: snippets::ConfigSnippet = toml::from_str(
            r#"
            [RabbitMQ]
            Host = "mq2"
            "#,
        )
        .unwrap();

        let input = ConfigInput::merge_snippets(vec![first, second]);
        assert_eq!(input.main.time_period, 60);
        assert_eq!(input.broker.host, "mq2");
        assert_eq!(input.broker.queue, "updates");
        assert_eq!(input.broker.port, 0);
    }

    #[test]
    fn reads_dropins_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("agent.toml");
        fs::write(&main, "[Main]\nTimePeriod = 10\n").unwrap();
        let dropins = dir.path().join("agent.toml.d");
        fs::create_dir(&dropins).unwrap();
        fs::write(dropins.join("20-late.toml"), "[Main]\nTimePeriod = 30\n").unwrap();
        fs::write(dropins.join("10-early.toml"), "[Main]\nTimePeriod = 20\n").unwrap();
        fs::write(dropins.join("README"), "not a snippet").unwrap();

        let input = ConfigInput::read_config(&main).unwrap();
        assert_eq!(input.main.time_period, 30);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = ConfigInput::read_config(&dir.path().join("absent.toml"));
        assert!(res.is_err());
    }
}
