//! Raw form submission and its validation into a [`FeatureRecord`].

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PipelineError;
use crate::types::{FeatureRecord, FuelType, SellerType, Transmission, MAX_KMS_DRIVEN};

/// Unvalidated form fields. Missing fields fall back to the form's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarForm {
    pub company: String,
    pub year: i64,
    pub present_price: f64,
    pub kms_driven: i64,
    pub fuel_type: String,
    pub seller_type: String,
    pub transmission: String,
    pub owner: i64,
}

impl Default for CarForm {
    fn default() -> Self {
        Self {
            company: "Maruti".to_string(),
            year: 2014,
            present_price: 5.59,
            kms_driven: 27000,
            fuel_type: FuelType::Petrol.to_string(),
            seller_type: SellerType::Dealer.to_string(),
            transmission: Transmission::Manual.to_string(),
            owner: 0,
        }
    }
}

impl CarForm {
    pub fn validate(self) -> Result<FeatureRecord, PipelineError> {
        FeatureRecord::try_from(self)
    }

    /// Decode the form from a JSON object one field at a time, so a wrongly
    /// typed value is reported against its own field. Decoded keys are
    /// removed from `obj`; absent keys keep their defaults.
    pub fn take_from(obj: &mut Map<String, Value>) -> Result<Self, PipelineError> {
        let mut form = Self::default();
        take_field(obj, "company", &mut form.company)?;
        take_field(obj, "year", &mut form.year)?;
        take_field(obj, "present_price", &mut form.present_price)?;
        take_field(obj, "kms_driven", &mut form.kms_driven)?;
        take_field(obj, "fuel_type", &mut form.fuel_type)?;
        take_field(obj, "seller_type", &mut form.seller_type)?;
        take_field(obj, "transmission", &mut form.transmission)?;
        take_field(obj, "owner", &mut form.owner)?;
        Ok(form)
    }
}

/// Move `name` out of `obj` into `slot`, leaving `slot` alone when absent.
pub fn take_field<T: DeserializeOwned>(
    obj: &mut Map<String, Value>,
    name: &'static str,
    slot: &mut T,
) -> Result<(), PipelineError> {
    if let Some(raw) = obj.remove(name) {
        *slot = serde_json::from_value(raw).map_err(|e| PipelineError::invalid(name, e.to_string()))?;
    }
    Ok(())
}

impl TryFrom<CarForm> for FeatureRecord {
    type Error = PipelineError;

    fn try_from(form: CarForm) -> Result<Self, Self::Error> {
        let year = i32::try_from(form.year)
            .map_err(|_| PipelineError::invalid("year", format!("{} is not a valid year", form.year)))?;
        if form.kms_driven < 0 || form.kms_driven > MAX_KMS_DRIVEN as i64 {
            return Err(PipelineError::invalid(
                "kms_driven",
                format!("{} is outside 0-{}", form.kms_driven, MAX_KMS_DRIVEN),
            ));
        }
        let owner = u8::try_from(form.owner)
            .map_err(|_| PipelineError::invalid("owner", format!("{} is not one of 0/1/2/3", form.owner)))?;

        FeatureRecord::new(
            form.company,
            year,
            form.present_price,
            form.kms_driven as u32,
            form.fuel_type.parse()?,
            form.seller_type.parse()?,
            form.transmission.parse()?,
            owner,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let record = CarForm::default().validate().unwrap();
        assert_eq!(record.company(), "Maruti");
        assert_eq!(record.year(), 2014);
        assert_eq!(record.kms_driven(), 27000);
        assert_eq!(record.fuel_type(), FuelType::Petrol);
    }

    #[test]
    fn test_malformed_fuel_type_is_invalid_input() {
        let form = CarForm {
            fuel_type: "Electric".to_string(),
            ..CarForm::default()
        };
        let err = form.validate().unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains("fuel_type"));
    }

    #[test]
    fn test_negative_kms_and_owner_rejected() {
        let form = CarForm {
            kms_driven: -5,
            ..CarForm::default()
        };
        assert!(form.validate().unwrap_err().is_invalid_input());

        let form = CarForm {
            owner: -1,
            ..CarForm::default()
        };
        assert!(form.validate().unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let form: CarForm = serde_json::from_str(r#"{"company":"Honda","fuel_type":"Diesel"}"#).unwrap();
        assert_eq!(form.company, "Honda");
        assert_eq!(form.year, 2014);
        assert_eq!(form.fuel_type, "Diesel");
    }

    #[test]
    fn test_take_from_names_mistyped_field() {
        let mut obj = serde_json::json!({ "year": "2014", "company": "Honda" })
            .as_object()
            .cloned()
            .unwrap();
        let err = CarForm::take_from(&mut obj).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput { field: "year", .. }));

        let mut obj = serde_json::json!({ "owner": 1.5 }).as_object().cloned().unwrap();
        let err = CarForm::take_from(&mut obj).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput { field: "owner", .. }));
    }

    #[test]
    fn test_take_from_leaves_other_keys() {
        let mut obj = serde_json::json!({ "company": "Honda", "feature": "price_prediction" })
            .as_object()
            .cloned()
            .unwrap();
        let form = CarForm::take_from(&mut obj).unwrap();
        assert_eq!(form.company, "Honda");
        assert_eq!(form.year, 2014);
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key("feature"));
    }

    #[test]
    fn test_blank_company_rejected() {
        let form = CarForm {
            company: "   ".to_string(),
            ..CarForm::default()
        };
        assert!(form.validate().is_err());
    }
}
