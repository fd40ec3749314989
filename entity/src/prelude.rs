pub use super::cart_items::Entity as CartItems;
pub use super::carts::Entity as Carts;
pub use super::financial_transactions::Entity as FinancialTransactions;
pub use super::order_items::Entity as OrderItems;
pub use super::orders::Entity as Orders;
pub use super::packages::Entity as Packages;
pub use super::session_records::Entity as SessionRecords;
pub use super::users::Entity as Users;
