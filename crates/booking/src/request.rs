//! Validated reservation requests.

use common::{Money, ShowtimeId};
use seat_store::{NewReservation, SeatSet};

use crate::error::{BookingError, Result};

/// Contact details of the customer holding a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl CustomerInfo {
    /// Validates and trims the customer fields.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into().trim().to_string();
        let email = email.into().trim().to_string();
        let phone = phone.into().trim().to_string();

        if name.is_empty() {
            return Err(BookingError::Validation(
                "customer_name is required".to_string(),
            ));
        }
        if !is_valid_email(&email) {
            return Err(BookingError::Validation(format!(
                "customer_email '{email}' is not a valid email address"
            )));
        }
        if !is_valid_phone(&phone) {
            return Err(BookingError::Validation(format!(
                "customer_phone '{phone}' is not a valid phone number"
            )));
        }

        Ok(Self { name, email, phone })
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn is_valid_phone(phone: &str) -> bool {
    phone.chars().any(|c| c.is_ascii_digit())
        && phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'))
}

/// A request to reserve a set of seats for one showtime.
///
/// Duplicate seat numbers collapse into one. Range checks against the
/// showtime happen inside the transaction, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveSeats {
    pub showtime_id: ShowtimeId,
    pub seat_numbers: SeatSet,
    pub customer: CustomerInfo,
}

impl ReserveSeats {
    pub fn new(
        showtime_id: ShowtimeId,
        seat_numbers: impl IntoIterator<Item = u32>,
        customer: CustomerInfo,
    ) -> Result<Self> {
        let seat_numbers: SeatSet = seat_numbers.into_iter().collect();
        if seat_numbers.is_empty() {
            return Err(BookingError::Validation(
                "seat_numbers must contain at least one seat".to_string(),
            ));
        }

        Ok(Self {
            showtime_id,
            seat_numbers,
            customer,
        })
    }

    pub fn seat_count(&self) -> u32 {
        self.seat_numbers.len() as u32
    }

    pub(crate) fn to_new_reservation(&self, total_amount: Money) -> NewReservation {
        NewReservation {
            showtime_id: self.showtime_id,
            seat_numbers: self.seat_numbers.clone(),
            customer_name: self.customer.name.clone(),
            customer_email: self.customer.email.clone(),
            customer_phone: self.customer.phone.clone(),
            total_amount,
        }
    }
}
