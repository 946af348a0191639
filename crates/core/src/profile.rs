#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

const MAX_PROFILE_NAME_LEN: usize = 64;

/// One output rendition a segment is transcoded into.
///
/// The name is the identity of the profile; two profiles with the same name and
/// different encoding parameters cannot coexist within one job.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    name: String,
    resolution: String,
    bitrate: String,
    framerate: u32,
}

impl Profile {
    pub fn try_new(
        name: impl Into<String>,
        resolution: impl Into<String>,
        bitrate: impl Into<String>,
        framerate: u32,
    ) -> Result<Self, ProfileError> {
        let name = name.into();
        validate_profile_name(&name)?;
        let resolution = resolution.into();
        validate_resolution(&resolution)?;
        if framerate == 0 {
            return Err(ProfileError::ZeroFramerate);
        }
        Ok(Self {
            name,
            resolution,
            bitrate: bitrate.into(),
            framerate,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolution(&self) -> &str {
        &self.resolution
    }

    pub fn bitrate(&self) -> &str {
        &self.bitrate
    }

    pub fn framerate(&self) -> u32 {
        self.framerate
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("profile name must not be empty")]
    EmptyName,
    #[error("profile name is too long")]
    NameTooLong,
    #[error("profile name contains control characters")]
    NameContainsControl,
    #[error("profile resolution must look like WIDTHxHEIGHT")]
    InvalidResolution,
    #[error("profile framerate must be positive")]
    ZeroFramerate,
    #[error("profile list must not be empty")]
    EmptyList,
    #[error("profile {0} is declared twice with different parameters")]
    ConflictingName(String),
}

fn validate_profile_name(value: &str) -> Result<(), ProfileError> {
    if value.trim().is_empty() {
        return Err(ProfileError::EmptyName);
    }
    if value.len() > MAX_PROFILE_NAME_LEN {
        return Err(ProfileError::NameTooLong);
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(ProfileError::NameContainsControl);
    }
    Ok(())
}

fn validate_resolution(value: &str) -> Result<(), ProfileError> {
    let Some((width, height)) = value.split_once('x') else {
        return Err(ProfileError::InvalidResolution);
    };
    let positive = |raw: &str| raw.parse::<u32>().is_ok_and(|v| v > 0);
    if !positive(width) || !positive(height) {
        return Err(ProfileError::InvalidResolution);
    }
    Ok(())
}

/// Deduplicates `profiles` and sorts them by name, descending.
///
/// The result is the byte layout of every combined transcoded-data hash for the
/// job, so it must never be re-derived from anything but this function.
pub fn canonical_profiles(profiles: Vec<Profile>) -> Result<Vec<Profile>, ProfileError> {
    if profiles.is_empty() {
        return Err(ProfileError::EmptyList);
    }
    let mut out: Vec<Profile> = Vec::with_capacity(profiles.len());
    for profile in profiles {
        match out.iter().find(|existing| existing.name == profile.name) {
            Some(existing) if *existing == profile => continue,
            Some(_) => return Err(ProfileError::ConflictingName(profile.name)),
            None => out.push(profile),
        }
    }
    out.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(out)
}
