//! Whitelist parsing and PAC generation.
//!
//! The whitelist is a line-oriented list of IPv4 hosts (`A.B.C.D`) and
//! networks (`A.B.C.D/N`). Lines starting with `#` and blank lines are
//! ignored; malformed lines are dropped silently. Only an entirely unusable
//! list is an error.

use std::fmt::Write as FmtWrite;
use std::net::Ipv4Addr;
use std::path::Path;

use super::error::{Error, Result};
use crate::constants;
use crate::logger::{self, LogLevel};

/// One whitelisted IPv4 network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkEntry {
    network: Ipv4Addr,
    mask: Ipv4Addr,
}

impl NetworkEntry {
    /// Builds an entry from a network address and prefix length (0..=32).
    #[must_use]
    pub fn new(network: Ipv4Addr, prefix: u8) -> Option<Self> {
        (prefix <= 32).then(|| Self {
            network,
            mask: prefix_to_mask(prefix),
        })
    }

    #[must_use]
    pub const fn network(&self) -> Ipv4Addr {
        self.network
    }

    #[must_use]
    pub const fn mask(&self) -> Ipv4Addr {
        self.mask
    }

    /// Prefix length recovered from the mask.
    #[must_use]
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.mask).leading_ones()
    }

    /// Whether `addr` falls inside this network, with `isInNet` semantics.
    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        u32::from(addr) & mask == u32::from(self.network) & mask
    }

    /// Parses one non-comment whitelist line.
    fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.split('/');
        let address = parse_dotted_quad(parts.next()?)?;
        let prefix = match parts.next() {
            None => 32,
            Some(bits) => parse_prefix(bits)?,
        };
        if parts.next().is_some() {
            return None;
        }
        Self::new(address, prefix)
    }
}

impl std::fmt::Display for NetworkEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len())
    }
}

/// Converts a prefix length into a dotted-quad subnet mask.
///
/// Callers guarantee `prefix <= 32`.
#[must_use]
pub fn prefix_to_mask(prefix: u8) -> Ipv4Addr {
    let value: u32 = if prefix == 0 {
        0
    } else {
        !((1u32 << (32 - u32::from(prefix))) - 1)
    };
    Ipv4Addr::from(value)
}

/// Accepts four decimal octets in 0..=255. Leading zeros are tolerated.
fn parse_dotted_quad(s: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut count = 0;
    for part in s.split('.') {
        if count == 4 || part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        octets[count] = part.parse::<u8>().ok()?;
        count += 1;
    }
    (count == 4).then(|| Ipv4Addr::from(octets))
}

fn parse_prefix(s: &str) -> Option<u8> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u8>().ok().filter(|p| *p <= 32)
}

/// Parses raw whitelist text into entries, preserving file order.
///
/// # Errors
///
/// Returns [`Error::InvalidWhitelist`] if no valid entry remains.
pub fn parse_whitelist(raw: &str) -> Result<Vec<NetworkEntry>> {
    let mut entries = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match NetworkEntry::parse_line(line) {
            Some(entry) => entries.push(entry),
            None => logger::log(
                LogLevel::Debug,
                "PAC",
                format!("Skipping malformed whitelist line: {line}"),
            ),
        }
    }

    if entries.is_empty() {
        return Err(Error::InvalidWhitelist);
    }
    Ok(entries)
}

/// Compiles entries into a proxy auto-config script.
///
/// Destinations whose resolved address matches any entry go through the
/// local SOCKS endpoint; everything else connects directly.
#[must_use]
pub fn compile_pac(entries: &[NetworkEntry]) -> String {
    let rules = entries
        .iter()
        .map(|e| format!("    {{ net: \"{}\", mask: \"{}\" }}", e.network, e.mask))
        .collect::<Vec<_>>()
        .join(",\n");

    let mut script = String::new();
    script.push_str("function FindProxyForURL(url, host) {\n");
    let _ = writeln!(script, "  {}", socks_declaration());
    let _ = writeln!(script, "  var whitelist = [\n{rules}\n  ];");
    script.push_str(
        r#"  var resolved = dnsResolve(host);
  if (!resolved) { return "DIRECT"; }
  for (var i = 0; i < whitelist.length; i++) {
    var item = whitelist[i];
    if (isInNet(resolved, item.net, item.mask)) {
      return socks;
    }
  }
  return "DIRECT";
}
"#,
    );
    script
}

/// Writes the seed whitelist if none exists yet.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn ensure_whitelist(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    crate::utils::write_user_file(path, constants::DEFAULT_WHITELIST)?;
    logger::log(
        LogLevel::Info,
        "PAC",
        format!("Created default whitelist at {}", path.display()),
    );
    Ok(())
}

/// Reads and parses the whitelist file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or
/// [`Error::InvalidWhitelist`] if it holds no valid entry.
pub fn load_whitelist(path: &Path) -> Result<Vec<NetworkEntry>> {
    let raw = std::fs::read_to_string(path)?;
    parse_whitelist(&raw)
}

/// Compiles and writes the PAC script.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_pac(path: &Path, entries: &[NetworkEntry]) -> Result<()> {
    crate::utils::write_user_file(path, compile_pac(entries))?;
    logger::log(
        LogLevel::Info,
        "PAC",
        format!(
            "Wrote PAC with {} network(s) to {}",
            entries.len(),
            path.display()
        ),
    );
    Ok(())
}

fn socks_declaration() -> String {
    format!(
        "var socks = \"SOCKS {}:{}\";",
        constants::SOCKS_HOST,
        constants::SOCKS_PORT
    )
}

/// Whether `script` was produced by [`compile_pac`] for the local endpoint.
#[must_use]
pub fn is_generated_pac(script: &str) -> bool {
    script.starts_with("function FindProxyForURL(url, host) {")
        && script.contains(&socks_declaration())
}

/// Auto-proxy source for the PAC file: its bare path, as `networksetup
/// -setautoproxyurl` takes it.
#[must_use]
pub fn pac_url(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masks(entries: &[NetworkEntry]) -> Vec<String> {
        entries.iter().map(|e| e.mask().to_string()).collect()
    }

    #[test]
    fn test_prefix_to_mask() {
        assert_eq!(prefix_to_mask(24).to_string(), "255.255.255.0");
        assert_eq!(prefix_to_mask(0).to_string(), "0.0.0.0");
        assert_eq!(prefix_to_mask(32).to_string(), "255.255.255.255");
        assert_eq!(prefix_to_mask(8).to_string(), "255.0.0.0");
        assert_eq!(prefix_to_mask(12).to_string(), "255.240.0.0");
        assert_eq!(prefix_to_mask(31).to_string(), "255.255.255.254");
    }

    #[test]
    fn test_parse_mixed_whitelist() {
        let raw = "10.0.0.0/8\n192.168.1.1\n  # comment\n\n172.16.0.0/12";
        let entries = parse_whitelist(raw).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            masks(&entries),
            vec!["255.0.0.0", "255.255.255.255", "255.240.0.0"]
        );
        assert_eq!(entries[0].network().to_string(), "10.0.0.0");
        assert_eq!(entries[1].network().to_string(), "192.168.1.1");
        assert_eq!(entries[2].network().to_string(), "172.16.0.0");
    }

    #[test]
    fn test_parse_keeps_file_order() {
        let raw = "192.168.0.0/16\n10.0.0.0/8\n1.1.1.1\n";
        let entries = parse_whitelist(raw).unwrap();
        let rendered: Vec<String> = entries.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["192.168.0.0/16", "10.0.0.0/8", "1.1.1.1/32"]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let raw = "\
256.0.0.1
10.0.0/8
10.0.0.0/33
10.0.0.0/-1
10.0.0.0/8/9
10.0.0.0/
a.b.c.d
10.0.0.0/8 # trailing comment
1.2.3.4.5
8.8.8.8
";
        let entries = parse_whitelist(raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].to_string(), "8.8.8.8/32");
    }

    #[test]
    fn test_empty_or_comment_only_whitelist_is_invalid() {
        assert!(matches!(parse_whitelist(""), Err(Error::InvalidWhitelist)));
        assert!(matches!(
            parse_whitelist("# only\n\n   \n# comments\n"),
            Err(Error::InvalidWhitelist)
        ));
        assert!(matches!(
            parse_whitelist("not-an-ip\n300.1.1.1/8\n"),
            Err(Error::InvalidWhitelist)
        ));
    }

    #[test]
    fn test_leading_zero_octets_are_normalized() {
        let entries = parse_whitelist("010.001.000.000/8").unwrap();
        assert_eq!(entries[0].network().to_string(), "10.1.0.0");
    }

    #[test]
    fn test_windows_line_endings() {
        let entries = parse_whitelist("10.0.0.0/8\r\n# c\r\n192.168.0.0/16\r\n").unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_contains_matches_isinnet() {
        let entry = NetworkEntry::new(Ipv4Addr::new(172, 16, 0, 0), 12).unwrap();
        assert!(entry.contains(Ipv4Addr::new(172, 31, 255, 1)));
        assert!(!entry.contains(Ipv4Addr::new(172, 32, 0, 1)));

        let everything = NetworkEntry::new(Ipv4Addr::new(0, 0, 0, 0), 0).unwrap();
        assert!(everything.contains(Ipv4Addr::new(8, 8, 8, 8)));
        assert!(NetworkEntry::new(Ipv4Addr::LOCALHOST, 33).is_none());
    }

    #[test]
    fn test_compile_pac_contains_entries_in_order() {
        let entries = parse_whitelist("192.168.0.0/16\n10.0.0.0/8\n").unwrap();
        let pac = compile_pac(&entries);

        assert!(pac.starts_with("function FindProxyForURL(url, host) {"));
        assert!(pac.contains("var socks = \"SOCKS 127.0.0.1:1080\";"));
        assert!(pac.contains("return \"DIRECT\";"));

        let first = pac
            .find("{ net: \"192.168.0.0\", mask: \"255.255.0.0\" }")
            .unwrap();
        let second = pac.find("{ net: \"10.0.0.0\", mask: \"255.0.0.0\" }").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_compile_pac_is_deterministic() {
        let entries = parse_whitelist("10.0.0.0/8\n1.2.3.4\n").unwrap();
        assert_eq!(compile_pac(&entries), compile_pac(&entries));
    }

    #[test]
    fn test_pac_entry_for_every_prefix() {
        for prefix in 0..=32u8 {
            let entry = NetworkEntry::new(Ipv4Addr::new(10, 20, 30, 40), prefix).unwrap();
            let pac = compile_pac(&[entry]);
            let expected = format!(
                "{{ net: \"10.20.30.40\", mask: \"{}\" }}",
                prefix_to_mask(prefix)
            );
            assert!(pac.contains(&expected), "prefix {prefix}");
            assert_eq!(entry.prefix_len(), u32::from(prefix));
        }
    }

    #[test]
    fn test_ensure_load_and_write_files() {
        let dir = std::env::temp_dir().join("proxytray_test_whitelist_files");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let whitelist = dir.join("whitelist.txt");
        let pac = dir.join("proxy.pac");

        ensure_whitelist(&whitelist).unwrap();
        let entries = load_whitelist(&whitelist).unwrap();
        assert_eq!(entries.len(), 3);

        // Existing files are never overwritten
        std::fs::write(&whitelist, "8.8.8.8\n").unwrap();
        ensure_whitelist(&whitelist).unwrap();
        assert_eq!(load_whitelist(&whitelist).unwrap().len(), 1);

        write_pac(&pac, &entries).unwrap();
        let script = std::fs::read_to_string(&pac).unwrap();
        assert!(script.contains("{ net: \"127.0.0.1\", mask: \"255.255.255.255\" }"));
        assert_eq!(pac_url(&pac), pac.display().to_string());
        assert!(is_generated_pac(&script));
        assert!(!is_generated_pac("function FindProxyForURL(url, host) { return \"DIRECT\"; }"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
