//! Command dispatch: thin glue mapping RESP commands onto the core cache
//! API. No command implements logic of its own beyond argument parsing and
//! reply shaping; anything stateful lives in [`Cache`](crate::Cache) or
//! [`ServerState`].

use std::fmt::Write as _;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;

use super::resp::Reply;
use super::ServerState;
use crate::CacheError;

/// What the connection task should do after a command.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Action {
    Continue,
    Close,
}

fn wrong_arity(command: &str) -> Reply {
    Reply::Error(format!(
        "ERR wrong number of arguments for '{}' command",
        command.to_ascii_lowercase()
    ))
}

fn not_an_integer() -> Reply {
    Reply::Error("ERR value is not an integer or out of range".to_string())
}

fn key_of(arg: &Bytes) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

fn parse_integer(arg: &Bytes) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

fn ttl_from_seconds(seconds: i64) -> Option<Duration> {
    if seconds <= 0 {
        // Redis deletes on non-positive expire; scheduling an immediate
        // expiration gets observationally the same result.
        Some(Duration::ZERO)
    } else {
        Some(Duration::from_secs(seconds as u64))
    }
}

/// Executes one parsed command and returns the reply plus the connection
/// action.
pub(crate) fn execute(state: &ServerState, args: &[Bytes]) -> (Reply, Action) {
    let command = args[0].to_ascii_uppercase();
    let command_text = key_of(&args[0]);
    let cache = &state.cache;

    let reply = match command.as_slice() {
        b"GET" => {
            if args.len() != 2 {
                wrong_arity(&command_text)
            } else {
                match cache.get(&key_of(&args[1])) {
                    Some(value) => Reply::Bulk(Bytes::copy_from_slice(&value)),
                    None => Reply::Null,
                }
            }
        },
        b"SET" => match args.len() {
            3 => {
                cache.set(key_of(&args[1]), args[2].to_vec());
                Reply::ok()
            },
            5 => {
                let Some(unit) = parse_integer(&args[4]) else {
                    return (not_an_integer(), Action::Continue);
                };
                let option = args[3].to_ascii_uppercase();
                let ttl = match option.as_slice() {
                    b"EX" => ttl_from_seconds(unit),
                    b"PX" => {
                        if unit <= 0 {
                            Some(Duration::ZERO)
                        } else {
                            Some(Duration::from_millis(unit as u64))
                        }
                    },
                    _ => return (Reply::Error("ERR syntax error".to_string()), Action::Continue),
                };
                cache.set_with_ttl(key_of(&args[1]), args[2].to_vec(), ttl);
                Reply::ok()
            },
            _ => wrong_arity(&command_text),
        },
        b"SETEX" => {
            if args.len() != 4 {
                wrong_arity(&command_text)
            } else {
                match parse_integer(&args[2]) {
                    Some(seconds) => {
                        cache.set_with_ttl(
                            key_of(&args[1]),
                            args[3].to_vec(),
                            ttl_from_seconds(seconds),
                        );
                        Reply::ok()
                    },
                    None => not_an_integer(),
                }
            }
        },
        b"MGET" => {
            if args.len() < 2 {
                wrong_arity(&command_text)
            } else {
                let keys: Vec<String> = args[1..].iter().map(key_of).collect();
                let values = cache.get_by_keys(keys.iter().cloned());
                Reply::Array(
                    keys.iter()
                        .map(|key| match values.get(key) {
                            Some(Some(value)) => Reply::Bulk(Bytes::copy_from_slice(value)),
                            _ => Reply::Null,
                        })
                        .collect(),
                )
            }
        },
        b"MSET" => {
            if args.len() < 3 || args.len() % 2 != 1 {
                wrong_arity(&command_text)
            } else {
                cache.set_all(
                    args[1..]
                        .chunks_exact(2)
                        .map(|pair| (key_of(&pair[0]), pair[1].to_vec())),
                );
                Reply::ok()
            }
        },
        b"DEL" => {
            if args.len() < 2 {
                wrong_arity(&command_text)
            } else {
                let deleted = cache.delete_all(args[1..].iter().map(key_of));
                Reply::Integer(deleted as i64)
            }
        },
        b"EXISTS" => {
            if args.len() < 2 {
                wrong_arity(&command_text)
            } else {
                let found = args[1..]
                    .iter()
                    .map(key_of)
                    .filter(|key| cache.get(key).is_some())
                    .count();
                Reply::Integer(found as i64)
            }
        },
        b"EXPIRE" => {
            if args.len() != 3 {
                wrong_arity(&command_text)
            } else {
                match parse_integer(&args[2]) {
                    Some(seconds) => {
                        let updated = cache.expire(&key_of(&args[1]), ttl_from_seconds(seconds));
                        Reply::Integer(if updated { 1 } else { 0 })
                    },
                    None => not_an_integer(),
                }
            }
        },
        b"TTL" => {
            if args.len() != 2 {
                wrong_arity(&command_text)
            } else {
                match cache.ttl(&key_of(&args[1])) {
                    Ok(remaining) => Reply::Integer(remaining.as_secs() as i64),
                    Err(CacheError::KeyDoesNotExist) => Reply::Integer(-2),
                    Err(CacheError::KeyHasNoExpiration) => Reply::Integer(-1),
                    Err(other) => Reply::Error(format!("ERR {other}")),
                }
            }
        },
        b"SCAN" => scan(state, args, &command_text),
        b"FLUSHDB" => {
            cache.clear();
            Reply::ok()
        },
        b"INFO" => {
            if args.len() > 2 {
                wrong_arity(&command_text)
            } else {
                let section = args
                    .get(1)
                    .map(|arg| arg.to_ascii_uppercase())
                    .unwrap_or_else(|| b"ALL".to_vec());
                Reply::Bulk(Bytes::from(info(state, &section)))
            }
        },
        b"PING" => match args.len() {
            1 => Reply::Simple("PONG".to_string()),
            2 => Reply::Bulk(args[1].clone()),
            _ => wrong_arity(&command_text),
        },
        b"ECHO" => {
            if args.len() != 2 {
                wrong_arity(&command_text)
            } else {
                Reply::Bulk(args[1].clone())
            }
        },
        b"QUIT" => return (Reply::ok(), Action::Close),
        _ => Reply::Error(format!("ERR unknown command '{command_text}'")),
    };
    (reply, Action::Continue)
}

/// `SCAN cursor [MATCH pattern] [COUNT n]`. The cache has no resumable
/// iteration, so the cursor is fixed: every scan returns one full page and
/// a next-cursor of 0.
fn scan(state: &ServerState, args: &[Bytes], command_text: &str) -> Reply {
    if args.len() < 2 {
        return wrong_arity(command_text);
    }
    if parse_integer(&args[1]).is_none() {
        return Reply::Error("ERR invalid cursor".to_string());
    }
    let mut pattern = "*".to_string();
    let mut limit = 0usize;
    let mut options = args[2..].chunks_exact(2);
    for option in &mut options {
        match option[0].to_ascii_uppercase().as_slice() {
            b"MATCH" => pattern = key_of(&option[1]),
            b"COUNT" => match parse_integer(&option[1]) {
                Some(count) if count > 0 => limit = count as usize,
                _ => return not_an_integer(),
            },
            _ => return Reply::Error("ERR syntax error".to_string()),
        }
    }
    if !options.remainder().is_empty() {
        return Reply::Error("ERR syntax error".to_string());
    }

    let keys = state.cache.get_keys_by_pattern(&pattern, limit);
    Reply::Array(vec![
        Reply::Bulk(Bytes::from_static(b"0")),
        Reply::Array(
            keys.into_iter()
                .map(|key| Reply::Bulk(Bytes::from(key)))
                .collect(),
        ),
    ])
}

fn info(state: &ServerState, section: &[u8]) -> String {
    let all = section == b"ALL";
    let mut text = String::new();
    if all || section == b"SERVER" {
        let uptime = state.start_time.elapsed().as_secs();
        let _ = writeln!(text, "# Server");
        let _ = writeln!(text, "process_id:{}", std::process::id());
        let _ = writeln!(text, "uptime_in_seconds:{uptime}");
        let _ = writeln!(text, "uptime_in_days:{}", uptime / 86_400);
        text.push('\n');
    }
    if all || section == b"CLIENTS" {
        let _ = writeln!(text, "# Clients");
        let _ = writeln!(
            text,
            "connected_clients:{}",
            state.connections.load(Ordering::Relaxed)
        );
        text.push('\n');
    }
    if all || section == b"STATS" {
        let stats = state.cache.stats();
        let _ = writeln!(text, "# Stats");
        let _ = writeln!(text, "current_keys:{}", state.cache.count());
        let _ = writeln!(text, "evicted_keys:{}", stats.evicted_keys);
        let _ = writeln!(text, "expired_keys:{}", stats.expired_keys);
        let _ = writeln!(text, "keyspace_hits:{}", stats.hits);
        let _ = writeln!(text, "keyspace_misses:{}", stats.misses);
        text.push('\n');
    }
    if all || section == b"MEMORY" {
        let _ = writeln!(text, "# Memory");
        let _ = writeln!(text, "used_memory:{}", state.cache.memory_usage());
        let _ = writeln!(text, "maxmemory:{}", state.cache.max_memory_usage());
        text.push('\n');
    }
    if all || section == b"REPLICATION" {
        let _ = writeln!(text, "# Replication");
        let _ = writeln!(text, "role:master");
        text.push('\n');
    }
    text.trim_end().to_string()
}
