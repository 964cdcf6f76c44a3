use crate::error::ApiError;

pub const LOGIN_MAX_ATTEMPTS: u64 = 5;
pub const LOGIN_WINDOW_SECS: u64 = 15 * 60;

pub fn login_key(email: &str) -> String {
    format!("rate:login:{}", email.trim().to_lowercase())
}

/// Checks a rate limit stored in Redis.
///
/// Uses the INCR + EXPIRE strategy:
/// - Increments a counter for `key`
/// - On first increment, sets TTL to `window_secs`
/// - Returns 429 if counter exceeds `max_attempts`
///
/// Redis being unreachable does not block the request.
pub async fn check_rate_limit(
    redis: &mut redis::aio::MultiplexedConnection,
    key: &str,
    max_attempts: u64,
    window_secs: u64,
) -> Result<(), ApiError> {
    let count: u64 = match redis::cmd("INCR").arg(key).query_async(redis).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("rate limit unavailable for {key}: {e}");
            return Ok(());
        }
    };

    if count == 1 {
        // TTL only on first increment so the window is not pushed back on each attempt
        let _: Result<(), _> = redis::cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .query_async(redis)
            .await;
    }

    if count > max_attempts {
        return Err(ApiError::TooManyRequests);
    }

    Ok(())
}

/// Forget the counter after a successful attempt.
pub async fn reset_rate_limit(redis: &mut redis::aio::MultiplexedConnection, key: &str) {
    let _: Result<(), _> = redis::cmd("DEL").arg(key).query_async(redis).await;
}

#[cfg(test)]
mod tests {
    use super::login_key;

    #[test]
    fn login_key_ignores_case_and_spaces() {
        assert_eq!(login_key(" Amel@Example.TN "), "rate:login:amel@example.tn");
    }
}
