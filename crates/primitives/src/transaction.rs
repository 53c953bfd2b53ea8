use std::collections::HashMap;

/// A parsed transaction as seen by the monitor: inputs and outputs
/// grouped by standard address, summed per address. Coinbase
/// transactions have an empty `tin` (§3).
#[derive(Debug, Clone)]
pub struct Transaction {
    pub hash: String,
    pub tout: HashMap<String, u64>,
    pub tin: HashMap<String, u64>,
}

impl Transaction {
    pub fn new(hash: String, tout: HashMap<String, u64>, tin: HashMap<String, u64>) -> Self {
        Self { hash, tout, tin }
    }

    /// True if any address on either side of the transaction is in
    /// `monitored` (§4.3 step 5).
    pub fn touches(&self, monitored: &std::collections::HashSet<String>) -> bool {
        self.tout.keys().any(|a| monitored.contains(a)) || self.tin.keys().any(|a| monitored.contains(a))
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Transaction {}
