//! Buyer details and the validation gate in front of payment.
//!
//! [`CheckoutForm`] tracks a draft as fields change. Payment creation only
//! accepts a [`ValidatedCustomer`], which can be built from a valid draft and
//! nothing else.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

const PHONE_DIGITS: usize = 10;

/// Which contact detail the storefront collects for the receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactFlow {
    #[default]
    Email,
    Phone,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address"))]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_phone", message = "Enter a 10-digit phone number"))]
    pub phone_number: Option<String>,
    #[validate(length(equal = 17, message = "VIN must be exactly 17 characters"))]
    pub vin_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if phone_digits(phone).is_some() {
        Ok(())
    } else {
        Err(ValidationError::new("phone"))
    }
}

/// Strips common separators and returns the digits of a 10-digit number.
fn phone_digits(phone: &str) -> Option<String> {
    let digits: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    (digits.len() == PHONE_DIGITS && digits.chars().all(|c| c.is_ascii_digit())).then_some(digits)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CustomerInfo {
    /// Trims every field, drops blank optionals and uppercases the VIN.
    pub fn normalized(self) -> Self {
        Self {
            full_name: self.full_name.trim().to_string(),
            email: non_blank(self.email),
            phone_number: non_blank(self.phone_number),
            vin_number: self.vin_number.trim().to_uppercase(),
            address: non_blank(self.address),
            city: non_blank(self.city),
            country: non_blank(self.country),
        }
    }
}

/// Field name to user-facing messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

const REQUIRED: &str = "required";

#[derive(Debug, Error, PartialEq)]
#[error("customer details are invalid")]
pub struct CustomerValidationError {
    pub fields: FieldErrors,
}

fn required(message: &'static str) -> ValidationError {
    ValidationError::new(REQUIRED).with_message(Cow::Borrowed(message))
}

/// Runs format validation plus the presence rules of the active flow.
fn check(info: &CustomerInfo, flow: ContactFlow) -> Result<(), ValidationErrors> {
    let mut errors = match info.validate() {
        Ok(()) => ValidationErrors::new(),
        Err(errors) => errors,
    };

    if info.full_name.is_empty() {
        errors.add("full_name", required("Full name is required"));
    }
    if info.vin_number.is_empty() {
        errors.add("vin_number", required("VIN is required"));
    }
    match flow {
        ContactFlow::Email if info.email.is_none() => {
            errors.add("email", required("Email is required"));
        }
        ContactFlow::Phone if info.phone_number.is_none() => {
            errors.add("phone_number", required("Phone number is required"));
        }
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Flattens validator errors, keeping only "required" when a field is blank.
fn field_errors(errors: &ValidationErrors) -> (FieldErrors, bool) {
    let mut grouped: BTreeMap<String, Vec<&ValidationError>> = BTreeMap::new();
    for (field, errs) in errors.field_errors() {
        let name = match field.as_ref() {
            "full_name" => "fullName",
            "phone_number" => "phoneNumber",
            "vin_number" => "vinNumber",
            other => other,
        };
        grouped.entry(name.to_string()).or_default().extend(errs.iter());
    }

    let mut fields = FieldErrors::new();
    let mut only_missing = true;
    for (name, errs) in grouped {
        let missing = errs.iter().any(|e| e.code == REQUIRED);
        only_missing &= missing;
        let messages = errs
            .iter()
            .filter(|e| !missing || e.code == REQUIRED)
            .map(|e| match &e.message {
                Some(message) => message.to_string(),
                None => e.code.to_string(),
            })
            .collect();
        fields.insert(name, messages);
    }

    (fields, only_missing)
}

/// Customer details that passed validation for a given contact flow.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCustomer {
    info: CustomerInfo,
    flow: ContactFlow,
}

impl ValidatedCustomer {
    pub fn new(info: CustomerInfo, flow: ContactFlow) -> Result<Self, CustomerValidationError> {
        let mut info = info.normalized();
        if let Err(errors) = check(&info, flow) {
            let (fields, _) = field_errors(&errors);
            return Err(CustomerValidationError { fields });
        }
        if let Some(digits) = info.phone_number.as_deref().and_then(phone_digits) {
            info.phone_number = Some(digits);
        }
        Ok(Self { info, flow })
    }

    pub fn info(&self) -> &CustomerInfo {
        &self.info
    }

    pub fn flow(&self) -> ContactFlow {
        self.flow
    }

    pub fn into_inner(self) -> CustomerInfo {
        self.info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    Empty,
    PartiallyFilled,
    Valid,
    Invalid,
}

/// A customer draft that revalidates on every change.
#[derive(Debug, Clone)]
pub struct CheckoutForm {
    flow: ContactFlow,
    draft: CustomerInfo,
    state: FormState,
    errors: FieldErrors,
}

impl CheckoutForm {
    pub fn new(flow: ContactFlow) -> Self {
        Self {
            flow,
            draft: CustomerInfo::default(),
            state: FormState::Empty,
            errors: FieldErrors::new(),
        }
    }

    pub fn state(&self) -> FormState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == FormState::Valid
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn draft(&self) -> &CustomerInfo {
        &self.draft
    }

    pub fn set_full_name(&mut self, value: &str) -> FormState {
        self.draft.full_name = value.to_string();
        self.revalidate()
    }

    pub fn set_email(&mut self, value: &str) -> FormState {
        self.draft.email = Some(value.to_string());
        self.revalidate()
    }

    pub fn set_phone_number(&mut self, value: &str) -> FormState {
        self.draft.phone_number = Some(value.to_string());
        self.revalidate()
    }

    /// The VIN is uppercased as it is entered.
    pub fn set_vin_number(&mut self, value: &str) -> FormState {
        self.draft.vin_number = value.to_uppercase();
        self.revalidate()
    }

    pub fn set_address(&mut self, value: &str) -> FormState {
        self.draft.address = Some(value.to_string());
        self.revalidate()
    }

    pub fn set_city(&mut self, value: &str) -> FormState {
        self.draft.city = Some(value.to_string());
        self.revalidate()
    }

    pub fn set_country(&mut self, value: &str) -> FormState {
        self.draft.country = Some(value.to_string());
        self.revalidate()
    }

    fn revalidate(&mut self) -> FormState {
        let normalized = self.draft.clone().normalized();
        let untouched = normalized.full_name.is_empty()
            && normalized.vin_number.is_empty()
            && normalized.email.is_none()
            && normalized.phone_number.is_none();

        (self.state, self.errors) = if untouched {
            (FormState::Empty, FieldErrors::new())
        } else {
            match check(&normalized, self.flow) {
                Ok(()) => (FormState::Valid, FieldErrors::new()),
                Err(errors) => {
                    let (fields, only_missing) = field_errors(&errors);
                    let state = if only_missing {
                        FormState::PartiallyFilled
                    } else {
                        FormState::Invalid
                    };
                    (state, fields)
                }
            }
        };
        self.state
    }

    /// The gate for payment: succeeds only from [`FormState::Valid`].
    pub fn validated(&self) -> Result<ValidatedCustomer, CustomerValidationError> {
        if !self.is_valid() {
            return Err(CustomerValidationError {
                fields: self.errors.clone(),
            });
        }
        ValidatedCustomer::new(self.draft.clone(), self.flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIN: &str = "1HGCM82633A004352";

    fn customer(name: &str, email: Option<&str>, phone: Option<&str>, vin: &str) -> CustomerInfo {
        CustomerInfo {
            full_name: name.to_string(),
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
            vin_number: vin.to_string(),
            ..CustomerInfo::default()
        }
    }

    #[test]
    fn seventeen_character_vin_passes() {
        let result = ValidatedCustomer::new(
            customer("Jane Doe", Some("jane@example.com"), None, VIN),
            ContactFlow::Email,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn short_vin_fails_with_length_error() {
        let err = ValidatedCustomer::new(
            customer("Jane Doe", Some("jane@example.com"), None, "SHORT"),
            ContactFlow::Email,
        )
        .expect_err("short VIN");

        let messages = err.fields.get("vinNumber").expect("vin error present");
        assert_eq!(messages, &vec!["VIN must be exactly 17 characters".to_string()]);
    }

    #[test]
    fn vin_is_uppercased() {
        let validated = ValidatedCustomer::new(
            customer("Jane", Some("jane@example.com"), None, &VIN.to_lowercase()),
            ContactFlow::Email,
        )
        .expect("valid");
        assert_eq!(validated.info().vin_number, VIN);
    }

    #[test]
    fn phone_flow_requires_ten_digits() {
        assert!(ValidatedCustomer::new(
            customer("Jane", None, Some("(555) 123-4567"), VIN),
            ContactFlow::Phone
        )
        .is_ok());
        assert!(ValidatedCustomer::new(
            customer("Jane", None, Some("555-1234"), VIN),
            ContactFlow::Phone
        )
        .is_err());
        assert!(
            ValidatedCustomer::new(customer("Jane", None, None, VIN), ContactFlow::Phone).is_err()
        );
    }

    #[test]
    fn email_flow_rejects_malformed_address() {
        let err = ValidatedCustomer::new(
            customer("Jane", Some("jane.example.com"), None, VIN),
            ContactFlow::Email,
        )
        .expect_err("bad email");
        assert!(err.fields.contains_key("email"));
    }

    #[test]
    fn form_moves_through_states() {
        let mut form = CheckoutForm::new(ContactFlow::Email);
        assert_eq!(form.state(), FormState::Empty);

        assert_eq!(form.set_full_name("Jane Doe"), FormState::PartiallyFilled);
        assert_eq!(form.set_email("jane@example.com"), FormState::PartiallyFilled);
        assert_eq!(form.set_vin_number("short"), FormState::Invalid);
        assert!(form.validated().is_err());

        assert_eq!(form.set_vin_number(&VIN.to_lowercase()), FormState::Valid);
        assert_eq!(form.draft().vin_number, VIN);
        assert!(form.is_valid());
        assert!(form.validated().is_ok());

        assert_eq!(form.set_full_name("   "), FormState::PartiallyFilled);
        assert!(!form.is_valid());
    }

    #[test]
    fn missing_any_required_field_is_never_valid() {
        let names = ["", "Jane"];
        let emails = [None, Some(""), Some("bad"), Some("jane@example.com")];
        let vins = ["", "SHORT", "1HGCM82633A0043521", VIN];

        for name in names {
            for email in emails {
                for vin in vins {
                    let mut form = CheckoutForm::new(ContactFlow::Email);
                    form.set_full_name(name);
                    if let Some(email) = email {
                        form.set_email(email);
                    }
                    form.set_vin_number(vin);

                    let complete = name == "Jane" && email == Some("jane@example.com") && vin == VIN;
                    assert_eq!(
                        form.is_valid(),
                        complete,
                        "name={name:?} email={email:?} vin={vin:?}"
                    );
                    assert_eq!(form.validated().is_ok(), complete);
                }
            }
        }
    }
}
