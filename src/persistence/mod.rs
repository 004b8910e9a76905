// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Backup and restore of platform configuration.
//!
//! - [`TbFinder`] - Lookup by id, by name, or all of a kind
//! - [`ConfigUploader`] - Idempotent restore from JSON files
//! - [`TbRemover`] - Safe removal, cascades and duplicate cleanup
//! - [`ConfigPaths`] - Layout of a backup directory
//!
//! # Examples
//!
//! ```no_run
//! use tbkit::{RestClient, TbConfig};
//! use tbkit::persistence::{ConfigPaths, ConfigUploader, Finder, Remover, TbRemover, Uploader};
//!
//! # async fn example() -> tbkit::Result<()> {
//! let rest = RestClient::connect(&TbConfig::from_env()?).await?;
//! let paths = ConfigPaths::new("tb-config")?;
//!
//! let uploader = ConfigUploader::new(rest.clone());
//! uploader.device_profile.load_all(&paths.profiles).await?;
//! uploader.device.load_all(&paths.devices).await?;
//!
//! let remover = TbRemover::new(rest);
//! if let Some(profile) = uploader.finder.device_profile.get_by_name("obsolete").await? {
//!     if let Some(id) = profile.id {
//!         remover.device_profile.remove_if_exist_cascade_by_id(id.id).await?;
//!     }
//! }
//! # let _ = remover.device.remove_if_exist_by_id(uuid::Uuid::nil()).await?;
//! # Ok(())
//! # }
//! ```

mod finder;
mod loader;
mod paths;
mod remover;
mod uploader;

pub use finder::{
    AssetFinder, CustomerFinder, DashboardFinder, DeviceFinder, DeviceProfileFinder, EntityFinder,
    Findable, Finder, RULE_CHAIN_EXPORT_LIMIT, RelationFinder, RuleChainDataFinder, RuleChainFinder,
    TbFinder, TenantFinder, TenantProfileFinder, UserFinder, WidgetFinder, WidgetsBundleFinder,
};
pub use loader::{json_files, read_node};
pub use paths::{ConfigPaths, substitute_vars};
pub use remover::{
    AssetRemover, CustomerRemover, DashboardRemover, DeviceProfileRemover, DeviceRemover,
    EntityRemover, RelationRemover, RemovedDeviceProfile, RemovedRuleChain, Remover,
    RuleChainRemover, TbRemover, TenantProfileRemover, UserRemover, WidgetRemover,
    WidgetsBundleRemover,
};
pub use uploader::{
    ConfigUploader, DeviceProfileUploader, DeviceUploader, RelationUploader, RuleChainUploader,
    SaveUploader, Uploader, UpsertUploader, WidgetTypeUploader,
};
