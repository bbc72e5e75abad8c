//! Lua scripts for atomic store transitions.
//!
//! Each conditional operation is a single server-side script so that the
//! decide-and-write step cannot interleave with a concurrent caller:
//! - session termination is a one-shot `active -> inactive` transition that
//!   releases the voucher's reservation in the same step
//! - voucher settlement rejects balance inflation
//! - reservation release only honors the current holder
//!
//! Documents are stored as JSON strings and manipulated with `cjson`;
//! scripts return small integer tuples, the Rust side refetches documents
//! afterwards (terminal states are stable, so the read needs no fence).

/// Lua script for the session termination transition.
///
/// Arguments:
/// - KEYS[1]: Session key (`session:{id}`)
/// - KEYS[2]: Reservation key (`voucher:{code}:active`)
/// - ARGV[1]: End timestamp (RFC 3339)
/// - ARGV[2]: Terminating actor tag
/// - ARGV[3]: Settled remaining seconds
/// - ARGV[4]: Session id (reservation holder check)
///
/// Returns `{status, seeded}`:
/// - `{1, seeded}`: transition performed; `seeded` is the pre-settlement value
/// - `{0, 0}`: session already inactive, nothing changed
/// - `{-1, 0}`: no such session
pub const FINISH_SESSION: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return {-1, 0}
end

local session = cjson.decode(raw)
if session['active'] == false then
    -- Already terminated, idempotent no-op
    return {0, 0}
end

local seeded = tonumber(session['remaining_duration'])
session['active'] = false
session['end_time'] = ARGV[1]
session['terminated_by'] = ARGV[2]
session['remaining_duration'] = tonumber(ARGV[3])
redis.call('SET', KEYS[1], cjson.encode(session))

-- Release the voucher slot only if this session still holds it
local holder = redis.call('GET', KEYS[2])
if holder == ARGV[4] then
    redis.call('DEL', KEYS[2])
end

return {1, seeded}
"#;

/// Lua script for voucher settlement.
///
/// Arguments:
/// - KEYS[1]: Voucher key (`voucher:{code}`)
/// - ARGV[1]: Settled remaining seconds
///
/// Returns `{status, current}`:
/// - `{1, requested}`: balance written
/// - `{0, current}`: rejected, the requested value exceeds the current balance
/// - `{-1, 0}`: no such voucher
pub const SETTLE_VOUCHER: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return {-1, 0}
end

local voucher = cjson.decode(raw)
local current = tonumber(voucher['remaining_duration'])
local requested = tonumber(ARGV[1])

if requested > current then
    -- A settlement can never raise the balance
    return {0, current}
end

voucher['remaining_duration'] = requested
redis.call('SET', KEYS[1], cjson.encode(voucher))
return {1, requested}
"#;

/// Lua script for the sticky `used` flag.
///
/// Arguments:
/// - KEYS[1]: Voucher key
///
/// Returns:
/// - 1: voucher exists (flag now set, idempotent)
/// - 0: no such voucher
pub const MARK_USED: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end

local voucher = cjson.decode(raw)
if voucher['used'] ~= true then
    voucher['used'] = true
    redis.call('SET', KEYS[1], cjson.encode(voucher))
end
return 1
"#;

/// Lua script for the staff voucher edit.
///
/// Arguments:
/// - KEYS[1]: Voucher key
/// - ARGV[1]: New total duration in seconds
/// - ARGV[2]: New price
///
/// Returns:
/// - 1: edit applied (balance raised to at least the new total)
/// - 0: no such voucher
pub const ADJUST_VOUCHER: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end

local voucher = cjson.decode(raw)
local new_total = tonumber(ARGV[1])
voucher['total_duration'] = new_total
voucher['price'] = tonumber(ARGV[2])

-- An edit raises the balance, it never lowers it
if tonumber(voucher['remaining_duration']) < new_total then
    voucher['remaining_duration'] = new_total
end

redis.call('SET', KEYS[1], cjson.encode(voucher))
return 1
"#;

/// Lua script for releasing a reservation (start rollback).
///
/// Arguments:
/// - KEYS[1]: Reservation key
/// - ARGV[1]: Session id that believes it holds the slot
///
/// Returns:
/// - 1: released
/// - 0: held by someone else or not held at all
pub const RELEASE_RESERVATION: &str = r#"
local holder = redis.call('GET', KEYS[1])
if holder == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
end
return 0
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_are_valid_lua() {
        // Verify the scripts are non-empty and contain expected calls
        assert!(FINISH_SESSION.contains("redis.call"));
        assert!(FINISH_SESSION.contains("cjson.decode"));
        assert!(FINISH_SESSION.contains("cjson.encode"));

        assert!(SETTLE_VOUCHER.contains("remaining_duration"));
        assert!(MARK_USED.contains("used"));
        assert!(ADJUST_VOUCHER.contains("total_duration"));
        assert!(RELEASE_RESERVATION.contains("DEL"));
    }

    #[test]
    fn test_finish_session_returns_correct_values() {
        // Return tuple convention:
        //  {1, seeded}: transition performed
        //  {0, 0}: already inactive (idempotent no-op)
        //  {-1, 0}: session does not exist
        assert!(FINISH_SESSION.contains("return {1, seeded}"));
        assert!(FINISH_SESSION.contains("return {0, 0}"));
        assert!(FINISH_SESSION.contains("return {-1, 0}"));
    }

    #[test]
    fn test_finish_session_guards_on_active_flag() {
        // The idempotence gate is the stored active flag, not caller state
        assert!(FINISH_SESSION.contains("if session['active'] == false then"));
    }

    #[test]
    fn test_finish_session_releases_only_own_reservation() {
        // A replayed terminate must not release a slot a newer session holds
        assert!(FINISH_SESSION.contains("if holder == ARGV[4] then"));
    }

    #[test]
    fn test_settle_rejects_inflation() {
        assert!(SETTLE_VOUCHER.contains("if requested > current then"));
        assert!(SETTLE_VOUCHER.contains("return {0, current}"));
    }

    #[test]
    fn test_mark_used_is_idempotent() {
        // Existing flag short-circuits the write
        assert!(MARK_USED.contains("if voucher['used'] ~= true then"));
    }

    #[test]
    fn test_adjust_never_lowers_balance() {
        assert!(ADJUST_VOUCHER.contains("if tonumber(voucher['remaining_duration']) < new_total then"));
    }

    #[test]
    fn test_release_checks_holder() {
        // Classic unlock-if-owner shape
        assert!(RELEASE_RESERVATION.contains("if holder == ARGV[1] then"));
        assert!(RELEASE_RESERVATION.contains("return 0"));
    }

    #[test]
    fn test_script_length() {
        // Ensure scripts are reasonable size (not accidentally empty or huge)
        for script in [
            FINISH_SESSION,
            SETTLE_VOUCHER,
            MARK_USED,
            ADJUST_VOUCHER,
            RELEASE_RESERVATION,
        ] {
            assert!(script.len() > 50);
            assert!(script.len() < 2000);
        }
    }
}
