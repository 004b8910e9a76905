// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Alarm endpoints and helpers.

use uuid::Uuid;

use super::RestClient;
use crate::entity::{
    Alarm, AlarmSearchStatus, AlarmSeverity, AlarmStatus, EntityId, PageData, TimePageLink,
};
use crate::error::Result;

/// Returns the first active alarm of the given type.
#[must_use]
pub fn find_active_alarm<'a>(alarms: &'a [Alarm], alarm_type: &str) -> Option<&'a Alarm> {
    alarms
        .iter()
        .find(|alarm| alarm.alarm_type == alarm_type && alarm.is_active())
}

impl RestClient {
    /// Queries the alarms of an entity.
    ///
    /// Without `page_link` the first 100 alarms are returned.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn get_alarms(
        &self,
        entity_id: EntityId,
        search_status: Option<AlarmSearchStatus>,
        status: Option<AlarmStatus>,
        page_link: Option<&TimePageLink>,
        fetch_originator: bool,
    ) -> Result<PageData<Alarm>> {
        let mut path = format!(
            "/api/alarm/{}/{}?fetchOriginator={fetch_originator}",
            entity_id.entity_type, entity_id.id
        );
        if let Some(search_status) = search_status {
            path.push_str("&searchStatus=");
            path.push_str(search_status.as_str());
        }
        if let Some(status) = status {
            path.push_str("&status=");
            path.push_str(status.as_str());
        }
        path.push('&');
        match page_link {
            Some(link) => path.push_str(&link.to_query()),
            None => path.push_str(&TimePageLink::default().to_query()),
        }

        self.get_json(&path).await
    }

    /// Creates or updates an alarm.
    ///
    /// # Errors
    ///
    /// Returns the platform's error if the alarm is rejected.
    pub async fn save_alarm(&self, alarm: &Alarm) -> Result<Alarm> {
        self.post_json("/api/alarm", alarm).await
    }

    /// Clears an alarm.
    ///
    /// # Errors
    ///
    /// Returns the platform's error for unknown alarms.
    pub async fn clear_alarm(&self, alarm_id: Uuid) -> Result<()> {
        self.post_empty(&format!("/api/alarm/{alarm_id}/clear")).await
    }

    /// Acknowledges an alarm.
    ///
    /// # Errors
    ///
    /// Returns the platform's error for unknown alarms.
    pub async fn ack_alarm(&self, alarm_id: Uuid) -> Result<()> {
        self.post_empty(&format!("/api/alarm/{alarm_id}/ack")).await
    }

    /// Raises an alarm of `alarm_type` unless one is already active.
    ///
    /// Returns the created alarm, or `None` if an active one exists.
    /// `entity_name` is only used for logging.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn new_alarm_if_not_active(
        &self,
        entity_id: EntityId,
        entity_name: &str,
        alarm_type: &str,
        severity: AlarmSeverity,
    ) -> Result<Option<Alarm>> {
        let page = self
            .get_alarms(entity_id, Some(AlarmSearchStatus::Active), None, None, false)
            .await?;

        if find_active_alarm(&page.data, alarm_type).is_some() {
            tracing::debug!(
                entity = %entity_name,
                alarm_type = %alarm_type,
                "Alarm already active, not creating a new one"
            );
            return Ok(None);
        }

        tracing::debug!(entity = %entity_name, alarm_type = %alarm_type, "Creating alarm");
        let alarm = Alarm::new(entity_id, alarm_type, severity);
        self.save_alarm(&alarm).await.map(Some)
    }

    /// Clears the active alarm of `alarm_type`, if there is one.
    ///
    /// Returns the cleared alarm.
    ///
    /// # Errors
    ///
    /// Returns transport and parse errors.
    pub async fn clear_alarm_if_active(
        &self,
        entity_id: EntityId,
        entity_name: &str,
        alarm_type: &str,
    ) -> Result<Option<Alarm>> {
        let page = self
            .get_alarms(entity_id, Some(AlarmSearchStatus::Active), None, None, false)
            .await?;

        let Some(active) = find_active_alarm(&page.data, alarm_type) else {
            tracing::debug!(
                entity = %entity_name,
                alarm_type = %alarm_type,
                "No active alarm, nothing to clear"
            );
            return Ok(None);
        };

        tracing::debug!(entity = %entity_name, alarm_type = %alarm_type, "Clearing alarm");
        if let Some(id) = active.id {
            self.clear_alarm(id.id).await?;
        }
        Ok(Some(active.clone()))
    }
}
