use crate::canvas::CanvasOptions;
use crate::error::AssemblyError;
use crate::regions::MergeOptions;
use crate::split::{ProfileOptions, SplitOptions};

pub const DEFAULT_MASK_DILATION: u32 = 5;

/// Every tunable of the engine, passed explicitly to each stage so several
/// chapters can run side by side with different settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub canvas: CanvasOptions,
    pub profile: ProfileOptions,
    pub split: SplitOptions,
    pub merge: MergeOptions,
    pub mask_dilation: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasOptions::default(),
            profile: ProfileOptions::default(),
            split: SplitOptions::default(),
            merge: MergeOptions::default(),
            mask_dilation: DEFAULT_MASK_DILATION,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), AssemblyError> {
        self.split.validate()?;
        if !self.merge.min_confidence.is_finite() {
            return Err(AssemblyError::InvalidConfig(
                "merge.min_confidence must be a finite number".to_string(),
            ));
        }
        if self.profile.background_tolerance == 0 {
            return Err(AssemblyError::InvalidConfig(
                "profile.background_tolerance of 0 marks every row unsafe".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn nan_confidence_and_zero_tolerance_are_rejected() {
        let mut config = EngineConfig::default();
        config.merge.min_confidence = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.profile.background_tolerance = 0;
        assert!(matches!(
            config.validate(),
            Err(AssemblyError::InvalidConfig(_))
        ));
    }
}
