//! Argument validation for the user-facing API
//!
//! Validation runs synchronously, before any resource is acquired, and
//! reports failures as [`MqttError::BadParameter`]. When a connection is in
//! AWS mode the AWS IoT profile constraints apply on top of the standard
//! MQTT rules.

use crate::constants::{aws, MAX_CLIENT_ID_LENGTH, MAX_WILL_PAYLOAD};
use crate::error::{MqttError, Result};
use crate::topic_matching;
use crate::types::{ConnectInfo, PublishInfo, SubscriptionInfo};
use crate::QoS;

/// Validates connection information, including the will message
///
/// # Errors
///
/// Returns `MqttError::BadParameter` if any field violates the MQTT rules
/// or, in AWS mode, the AWS IoT profile constraints.
pub fn validate_connect_info(info: &ConnectInfo) -> Result<()> {
    if info.client_id.is_empty() {
        return Err(MqttError::BadParameter(
            "client identifier must not be empty".to_string(),
        ));
    }

    if info.client_id.len() > MAX_CLIENT_ID_LENGTH {
        // Permitted, but many brokers reject identifiers this long.
        tracing::warn!(
            length = info.client_id.len(),
            "Client identifier is longer than 23 bytes"
        );
    }

    if info.keep_alive.as_secs() > u64::from(u16::MAX) {
        return Err(MqttError::BadParameter(
            "keep-alive interval does not fit in 16 bits of seconds".to_string(),
        ));
    }

    if let Some(will) = &info.will {
        validate_publish(info.aws_mode, will)?;

        if will.payload.len() > MAX_WILL_PAYLOAD {
            // This restriction applies only to will messages, not to
            // normal PUBLISH payloads.
            tracing::error!(
                payload_len = will.payload.len(),
                "Will payload cannot be larger than 65535 bytes"
            );
            return Err(MqttError::BadParameter(
                "will payload cannot be larger than 65535 bytes".to_string(),
            ));
        }
    }

    if !info.clean_session && !info.previous_subscriptions.is_empty() {
        validate_subscription_list(info.aws_mode, &info.previous_subscriptions)?;
    }

    Ok(())
}

/// Validates publish information
///
/// # Errors
///
/// Returns `MqttError::BadParameter` for an invalid topic name, an
/// unsupported quality of service, or an inconsistent retry configuration.
pub fn validate_publish(aws_mode: bool, info: &PublishInfo) -> Result<()> {
    topic_matching::validate_topic(&info.topic)?;

    if info.qos == QoS::ExactlyOnce {
        return Err(MqttError::BadParameter(
            "QoS 2 is not supported".to_string(),
        ));
    }

    if info.retry_limit > 0 && info.retry_interval.is_zero() {
        return Err(MqttError::BadParameter(
            "retry interval must be non-zero when a retry limit is set".to_string(),
        ));
    }

    if aws_mode {
        validate_aws_topic_length(&info.topic)?;
    }

    Ok(())
}

/// Validates a subscription list for SUBSCRIBE or UNSUBSCRIBE
///
/// # Errors
///
/// Returns `MqttError::BadParameter` if the list is empty or any entry has
/// an invalid filter or unsupported quality of service.
pub fn validate_subscription_list(aws_mode: bool, list: &[SubscriptionInfo]) -> Result<()> {
    if list.is_empty() {
        return Err(MqttError::BadParameter(
            "subscription list must not be empty".to_string(),
        ));
    }

    for subscription in list {
        topic_matching::validate_filter(&subscription.topic_filter)?;

        if subscription.qos == QoS::ExactlyOnce {
            return Err(MqttError::BadParameter(
                "QoS 2 is not supported".to_string(),
            ));
        }

        if aws_mode {
            validate_aws_topic_length(&subscription.topic_filter)?;
        }
    }

    Ok(())
}

/// Clamps a keep-alive interval to the AWS IoT accepted range
///
/// AWS IoT limits keep-alive to [30, 1200] seconds and treats a disabled
/// keep-alive (0) as the maximum.
#[must_use]
pub fn clamp_aws_keep_alive(keep_alive_secs: u16) -> u16 {
    if keep_alive_secs == 0 {
        aws::MAX_KEEPALIVE_SECS
    } else {
        keep_alive_secs.clamp(aws::MIN_KEEPALIVE_SECS, aws::MAX_KEEPALIVE_SECS)
    }
}

fn validate_aws_topic_length(topic: &str) -> Result<()> {
    if topic.len() > aws::MAX_TOPIC_LENGTH {
        return Err(MqttError::BadParameter(format!(
            "topic of {} bytes exceeds the AWS IoT limit of {} bytes",
            topic.len(),
            aws::MAX_TOPIC_LENGTH
        )));
    }
    Ok(())
}
