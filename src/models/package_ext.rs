/// Extension methods for packages entity
///
/// Complements the entity in entity/src/packages.rs with credit arithmetic.
use entity::packages;

/// Extension trait for Package model
pub trait PackageExt {
    /// Credits granted per purchased unit: `sessions`, else `total_sessions`, else 0
    fn sessions_per_unit(&self) -> i32;

    /// Price actually charged for one unit
    fn unit_price_cents(&self) -> i64;
}

impl PackageExt for packages::Model {
    fn sessions_per_unit(&self) -> i32 {
        self.sessions
            .filter(|s| *s > 0)
            .or(self.total_sessions)
            .unwrap_or(0)
            .max(0)
    }

    fn unit_price_cents(&self) -> i64 {
        self.price_cents.max(0)
    }
}
