use std::path::Path;

use indexmap::IndexMap;
use vmscope_core::{SymbolResolver, Va};

/// Kernel symbols parsed from a `System.map` file.
///
/// Each line has the form `<hex address> <type> <name>`. When a name is
/// defined more than once, the first definition wins.
#[derive(Debug, Default, Clone)]
pub struct SystemMap {
    symbols: IndexMap<String, Va>,
}

impl SystemMap {
    /// Parses the contents of a `System.map` file.
    ///
    /// Malformed lines are skipped.
    pub fn parse(content: &str) -> Self {
        let mut symbols = IndexMap::new();

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(address), Some(_kind), Some(name)) =
                (fields.next(), fields.next(), fields.next())
            else {
                tracing::warn!(line = number + 1, "malformed System.map line");
                continue;
            };

            let address = match u64::from_str_radix(address, 16) {
                Ok(address) => address,
                Err(err) => {
                    tracing::warn!(line = number + 1, %err, "invalid symbol address");
                    continue;
                }
            };

            symbols.entry(name.to_owned()).or_insert(Va(address));
        }

        tracing::debug!(symbols = symbols.len(), "System.map parsed");
        Self { symbols }
    }

    /// Reads and parses a `System.map` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Returns the address of `name`.
    pub fn get(&self, name: &str) -> Option<Va> {
        self.symbols.get(name).copied()
    }

    /// Returns the number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns `true` if no symbol was parsed.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterates over the symbols in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Va)> {
        self.symbols
            .iter()
            .map(|(name, address)| (name.as_str(), *address))
    }
}

impl SymbolResolver for SystemMap {
    fn resolve(&self, name: &str) -> Option<Va> {
        self.get(name)
    }
}

impl FromIterator<(String, Va)> for SystemMap {
    fn from_iter<T: IntoIterator<Item = (String, Va)>>(iter: T) -> Self {
        let mut symbols = IndexMap::new();
        for (name, address) in iter {
            symbols.entry(name).or_insert(address);
        }

        Self { symbols }
    }
}
