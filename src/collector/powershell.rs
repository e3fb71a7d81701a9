//! Windows Update Agent searcher, driven through PowerShell.

use super::{Collector, UpdateRecord};
use failure::{Fallible, ResultExt};
use std::process::Command;

/// Searcher script; `{query}` is replaced with the quoted filter.
static SEARCH_SCRIPT: &str = r#"
$ErrorActionPreference = 'Stop'
$session = New-Object -ComObject Microsoft.Update.Session
$session.ClientApplicationID = 'wgsa-agent'
$result = $session.CreateUpdateSearcher().Search({query})
$updates = @($result.Updates | ForEach-Object {
    $kb = ''
    if ($_.KBArticleIDs.Count -gt 0) { $kb = 'KB' + $_.KBArticleIDs.Item(0) }
    $product = @($_.Categories | Where-Object { $_.Type -eq 'Product' } | ForEach-Object { $_.Name }) | Select-Object -First 1
    [PSCustomObject]@{ Id = $kb; Title = $_.Title; Product = $product }
})
ConvertTo-Json -Compress -InputObject $updates
"#;

/// Collector shelling out to `powershell.exe`.
#[derive(Clone, Debug)]
pub(crate) struct PowershellCollector {
    program: String,
}

impl Default for PowershellCollector {
    fn default() -> Self {
        Self {
            program: String::from("powershell.exe"),
        }
    }
}

impl Collector for PowershellCollector {
    fn collect(&self, query: &str) -> Fallible<Vec<UpdateRecord>> {
        let script = SEARCH_SCRIPT.replace("{query}", &quote(query));
        trace!("searching updates with query {:?}", query);

        let output = Command::new(&self.program)
            .args(&["-NoProfile", "-NonInteractive", "-Command", script.as_str()])
            .output()
            .context(format!("failed to run '{}'", self.program))?;

        if !output.status.success() {
            bail!(
                "update search failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_search_output(&output.stdout)
    }
}

/// Quote a string as a PowerShell single-quoted literal.
fn quote(input: &str) -> String {
    format!("'{}'", input.replace('\'', "''"))
}

/// Raw entry emitted by the searcher script.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchEntry {
    id: Option<String>,
    title: Option<String>,
    product: Option<String>,
}

/// Parse the JSON array printed by the searcher script.
fn parse_search_output(stdout: &[u8]) -> Fallible<Vec<UpdateRecord>> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Ok(vec![]);
    }

    let entries: Vec<SearchEntry> =
        serde_json::from_str(text).context("failed to parse update search output")?;
    let records = entries
        .into_iter()
        .map(|e| UpdateRecord {
            id: e.id.unwrap_or_default(),
            title: e.title.unwrap_or_default(),
            product: e.product.unwrap_or_default(),
        })
        .collect();

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_output() {
        let out = br#"[{"Id":"KB5034441","Title":"Security Update for Windows (KB5034441)","Product":"Windows 10"},{"Id":"","Title":"Defender definitions","Product":null}]"#;
        let records = parse_search_output(out).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "KB5034441");
        assert_eq!(records[0].product, "Windows 10");
        assert_eq!(records[1].id, "");
        assert_eq!(records[1].product, "");
    }

    #[test]
    fn empty_output_means_no_updates() {
        assert!(parse_search_output(b"").unwrap().is_empty());
        assert!(parse_search_output(b"[]\r\n").unwrap().is_empty());
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(parse_search_output(b"Access is denied.").is_err());
    }

    #[test]
    fn query_quoting() {
        assert_eq!(quote("IsInstalled=0"), "'IsInstalled=0'");
        assert_eq!(quote("Type='Software'"), "'Type=''Software'''");
    }

    #[test]
    fn missing_program_is_an_error() {
        let collector = PowershellCollector {
            program: String::from("/nonexistent/powershell"),
        };
        assert!(collector.collect("IsInstalled=0").is_err());
    }
}
