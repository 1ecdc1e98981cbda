use anyhow::Result;
use serde_json::Value;

use crate::error::SnapcalError;
use crate::models::{
    AnalyzedFood, MAX_IMAGE_BYTES, validate_calories, validate_food_name, validate_serving,
};

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(JPEG_MAGIC) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(PNG_MAGIC) {
            Some(ImageFormat::Png)
        } else {
            None
        }
    }
}

/// A meal photo accepted for analysis.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl ImageUpload {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SnapcalError> {
        if bytes.is_empty() {
            return Err(SnapcalError::Input("file is empty".to_string()));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(SnapcalError::Input(format!(
                "file is {} bytes, the limit is {MAX_IMAGE_BYTES} bytes (10 MB)",
                bytes.len()
            )));
        }
        let format = ImageFormat::sniff(&bytes).ok_or_else(|| {
            SnapcalError::Input("only JPEG and PNG images are supported".to_string())
        })?;
        Ok(Self { bytes, format })
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Hosted model that identifies foods in a photo.
///
/// Implementations own the transport. The returned JSON is expected to be an
/// array of `{foodName, calories, servingSizeGrams}` objects and is checked by
/// [`parse_analysis_response`] before anything uses it.
pub trait FoodAnalyzer: Send + Sync {
    fn analyze(&self, image: &ImageUpload) -> Result<Value>;
}

/// Validate an analysis response. Any problem rejects the whole response.
pub fn parse_analysis_response(response: Value) -> Result<Vec<AnalyzedFood>, SnapcalError> {
    let Value::Array(items) = response else {
        return Err(SnapcalError::Analysis(
            "AI response is not a valid array".to_string(),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let food: AnalyzedFood = serde_json::from_value(item).map_err(|e| {
                SnapcalError::Analysis(format!("item {} is malformed: {e}", idx + 1))
            })?;
            check_food(&food)
                .map_err(|e| SnapcalError::Analysis(format!("item {} is invalid: {e:#}", idx + 1)))?;
            Ok(AnalyzedFood {
                food_name: food.food_name.trim().to_string(),
                ..food
            })
        })
        .collect()
}

fn check_food(food: &AnalyzedFood) -> Result<()> {
    validate_food_name(&food.food_name)?;
    validate_calories(food.calories)?;
    validate_serving(food.serving_size_grams)?;
    Ok(())
}
