use std::borrow::Cow;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::models::{NewOrderLine, NewProduct, NewUser};
use crate::services::{CardDetails, PaymentRequest};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

impl From<CreateUserRequest> for NewUser {
    fn from(req: CreateUserRequest) -> Self {
        Self {
            name: req.name,
            email: req.email,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom(function = "validate_price"))]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock_quantity: i32,
}

impl From<CreateProductRequest> for NewProduct {
    fn from(req: CreateProductRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            price: req.price,
            stock_quantity: req.stock_quantity,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct OrderItemRequest {
    #[validate(range(min = 1, message = "Product id must be positive"))]
    pub product_id: i64,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(range(min = 1, message = "User id must be positive"))]
    pub user_id: i64,
    #[validate(nested)]
    pub items: Vec<OrderItemRequest>,
}

impl CreateOrderRequest {
    pub fn lines(&self) -> Vec<NewOrderLine> {
        self.items
            .iter()
            .map(|item| NewOrderLine {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect()
    }
}

/// Card fields are held as secrets so they never reach logs or error bodies.
#[derive(Deserialize, Validate)]
#[validate(schema(function = "validate_card"))]
pub struct CreatePaymentRequest {
    #[validate(range(min = 1, message = "User id must be positive"))]
    pub user_id: i64,
    #[validate(range(min = 1, message = "Order id must be positive"))]
    pub order_id: i64,
    pub amount: Decimal,
    pub hpan: Secret<String>,
    pub exp_date: Secret<String>,
    pub cvc: Secret<String>,
}

impl From<CreatePaymentRequest> for PaymentRequest {
    fn from(req: CreatePaymentRequest) -> Self {
        Self {
            user_id: req.user_id,
            order_id: req.order_id,
            amount: req.amount,
            card: CardDetails {
                hpan: req.hpan,
                exp_date: req.exp_date,
                cvc: req.cvc,
            },
        }
    }
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        return Err(ValidationError::new("negative_price"));
    }
    if price.normalize().scale() > 2 {
        return Err(ValidationError::new("price_precision"));
    }
    Ok(())
}

fn all_digits(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}

/// Schema rule: field rules would attach the rejected value to the error.
fn validate_card(req: &CreatePaymentRequest) -> Result<(), ValidationError> {
    if !all_digits(req.hpan.expose_secret(), 12, 19) {
        return Err(card_error("invalid_card_number", "Card number must be 12 to 19 digits"));
    }

    // MMYY
    let exp = req.exp_date.expose_secret();
    let month_ok = exp
        .get(..2)
        .and_then(|mm| mm.parse::<u8>().ok())
        .is_some_and(|mm| (1..=12).contains(&mm));
    if !all_digits(exp, 4, 4) || !month_ok {
        return Err(card_error("invalid_expiry", "Expiry must be MMYY"));
    }

    if !all_digits(req.cvc.expose_secret(), 3, 4) {
        return Err(card_error("invalid_cvc", "CVC must be 3 or 4 digits"));
    }

    Ok(())
}

fn card_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}
