use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPrefix {
    /// Checkout grant
    Checkout,
    /// Admin recovery payment
    Recovery,
}

impl OrderPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkout => "ORD",
            Self::Recovery => "REC",
        }
    }
}

/// `<PREFIX>-<base36 unix millis>-<4 hex>`, e.g. `REC-M5X2Q9ZK-3FA1`
pub fn generate_order_number(prefix: OrderPrefix, now: time::OffsetDateTime) -> String {
    let millis = (now.unix_timestamp_nanos() / 1_000_000).max(0) as u128;
    let suffix = Uuid::new_v4().simple().to_string()[..4].to_uppercase();
    format!("{}-{}-{}", prefix.as_str(), to_base36(millis), suffix)
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
