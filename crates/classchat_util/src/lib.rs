#![forbid(unsafe_code)]

pub mod endpoint {
	use core::fmt;

	/// URL scheme accepted for service endpoints.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub enum Scheme {
		Http,
		Https,
		Ws,
		Wss,
	}

	impl Scheme {
		pub const fn as_str(self) -> &'static str {
			match self {
				Scheme::Http => "http",
				Scheme::Https => "https",
				Scheme::Ws => "ws",
				Scheme::Wss => "wss",
			}
		}

		pub const fn is_secure(self) -> bool {
			matches!(self, Scheme::Https | Scheme::Wss)
		}

		pub const fn is_websocket(self) -> bool {
			matches!(self, Scheme::Ws | Scheme::Wss)
		}
	}

	/// Parsed `scheme://host[:port][/base/path]` endpoint.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct ServiceEndpoint {
		pub scheme: Scheme,
		pub host: String,
		pub port: Option<u16>,
		/// Base path without a trailing slash (empty for the root).
		pub base_path: String,
	}

	impl ServiceEndpoint {
		/// Parse an endpoint string. Query strings and fragments are rejected.
		pub fn parse(s: &str) -> Result<Self, String> {
			let s = s.trim();
			if s.is_empty() {
				return Err("endpoint must be non-empty (expected scheme://host[:port])".to_string());
			}

			let (scheme_s, rest) = s
				.split_once("://")
				.ok_or_else(|| format!("invalid endpoint (missing scheme, expected scheme://host[:port]): {s}"))?;

			let scheme = match scheme_s.to_ascii_lowercase().as_str() {
				"http" => Scheme::Http,
				"https" => Scheme::Https,
				"ws" => Scheme::Ws,
				"wss" => Scheme::Wss,
				other => return Err(format!("unsupported endpoint scheme: {other}")),
			};

			if rest.contains('?') || rest.contains('#') {
				return Err(format!("invalid endpoint (query/fragment not allowed): {s}"));
			}

			let (authority, path) = match rest.find('/') {
				Some(idx) => (&rest[..idx], &rest[idx..]),
				None => (rest, ""),
			};

			let (host, port) = split_host_port(authority).map_err(|e| format!("{e}: {s}"))?;

			Ok(Self {
				scheme,
				host,
				port,
				base_path: path.trim_end_matches('/').to_string(),
			})
		}

		/// `scheme://host[:port]`.
		pub fn origin(&self) -> String {
			match self.port {
				Some(port) => format!("{}://{}:{}", self.scheme.as_str(), self.host, port),
				None => format!("{}://{}", self.scheme.as_str(), self.host),
			}
		}

		/// Append `path` to the base path. `path` should start with `/`.
		pub fn join(&self, path: &str) -> String {
			let path = if path.starts_with('/') {
				path.to_string()
			} else {
				format!("/{path}")
			};
			format!("{}{}{}", self.origin(), self.base_path, path)
		}
	}

	impl fmt::Display for ServiceEndpoint {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(f, "{}{}", self.origin(), self.base_path)
		}
	}

	fn split_host_port(authority: &str) -> Result<(String, Option<u16>), String> {
		if authority.is_empty() {
			return Err("invalid endpoint host".to_string());
		}

		// Bracketed IPv6: [::1] or [::1]:8000
		if let Some(stripped) = authority.strip_prefix('[') {
			let (inner, after) = stripped
				.split_once(']')
				.ok_or_else(|| "invalid endpoint host (unterminated IPv6 bracket)".to_string())?;
			if inner.is_empty() {
				return Err("invalid endpoint host".to_string());
			}
			let host = format!("[{inner}]");
			let port = match after.strip_prefix(':') {
				Some(p) => Some(parse_port(p)?),
				None if after.is_empty() => None,
				None => return Err("invalid endpoint host".to_string()),
			};
			return Ok((host, port));
		}

		if authority.matches(':').count() > 1 {
			return Err("invalid endpoint host (IPv6 must be bracketed like ws://[::1]:8000)".to_string());
		}

		match authority.split_once(':') {
			Some((host, port)) => {
				if host.trim().is_empty() {
					return Err("invalid endpoint host".to_string());
				}
				Ok((host.to_string(), Some(parse_port(port)?)))
			}
			None => Ok((authority.to_string(), None)),
		}
	}

	fn parse_port(s: &str) -> Result<u16, String> {
		let port: u16 = s
			.trim()
			.parse()
			.map_err(|_| "invalid endpoint port (expected 1..=65535)".to_string())?;
		if port == 0 {
			return Err("invalid endpoint port (expected 1..=65535)".to_string());
		}
		Ok(port)
	}

	/// Validate a `ws://` or `wss://` endpoint.
	pub fn validate_ws_endpoint(s: &str) -> Result<ServiceEndpoint, String> {
		let e = ServiceEndpoint::parse(s)?;
		if !e.scheme.is_websocket() {
			return Err(format!("expected ws:// or wss:// endpoint: {s}"));
		}
		Ok(e)
	}

	/// Validate an `http://` or `https://` endpoint.
	pub fn validate_http_endpoint(s: &str) -> Result<ServiceEndpoint, String> {
		let e = ServiceEndpoint::parse(s)?;
		if e.scheme.is_websocket() {
			return Err(format!("expected http:// or https:// endpoint: {s}"));
		}
		Ok(e)
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn parses_host_and_port() {
			let e = ServiceEndpoint::parse("ws://localhost:8000").unwrap();
			assert_eq!(e.scheme, Scheme::Ws);
			assert_eq!(e.host, "localhost");
			assert_eq!(e.port, Some(8000));
			assert_eq!(e.origin(), "ws://localhost:8000");
		}

		#[test]
		fn keeps_base_path_without_trailing_slash() {
			let e = ServiceEndpoint::parse("https://school.example.com/backend/").unwrap();
			assert_eq!(e.port, None);
			assert_eq!(e.base_path, "/backend");
			assert_eq!(
				e.join("/api/forum/7/messages"),
				"https://school.example.com/backend/api/forum/7/messages"
			);
			assert_eq!(e.join("x"), "https://school.example.com/backend/x");
		}

		#[test]
		fn parses_bracketed_ipv6() {
			let e = ServiceEndpoint::parse("wss://[::1]:8443").unwrap();
			assert_eq!(e.host, "[::1]");
			assert_eq!(e.port, Some(8443));
			assert!(e.scheme.is_secure());
		}

		#[test]
		fn rejects_bad_inputs() {
			assert!(ServiceEndpoint::parse("").is_err());
			assert!(ServiceEndpoint::parse("localhost:8000").is_err());
			assert!(ServiceEndpoint::parse("ftp://host").is_err());
			assert!(ServiceEndpoint::parse("ws://host:0").is_err());
			assert!(ServiceEndpoint::parse("ws://host:8000?x=y").is_err());
			assert!(ServiceEndpoint::parse("ws://::1:8000").is_err());
		}

		#[test]
		fn scheme_validation() {
			assert!(validate_ws_endpoint("wss://chat.example.com").is_ok());
			assert!(validate_ws_endpoint("http://chat.example.com").is_err());
			assert!(validate_http_endpoint("http://localhost:8000").is_ok());
			assert!(validate_http_endpoint("ws://localhost:8000").is_err());
		}
	}
}
