//! Domain models for commerce-service.

mod order;
mod payment;
mod product;
mod user;

pub use order::{NewOrderLine, Order, OrderItem, OrderStatus, OrderWithItems};
pub use payment::{NewPayment, Payment, PaymentStatus};
pub use product::{NewProduct, Product};
pub use user::{NewUser, User};
