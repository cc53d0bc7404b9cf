//! Core GMP session client.
//!
//! Wraps a [`GvmConnection`] with the GMP session commands and the response
//! envelope check every command shares. Report operations live in
//! [`crate::report`].

use log::{debug, info};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;

use crate::{GvmConfig, GvmConnection, GvmError, Result};

/// Core GMP client holding one authenticated (or not yet authenticated)
/// session.
///
/// GMP sessions are stateful: `authenticate` must succeed on this connection
/// before data commands are accepted, which is why the operations take
/// `&mut self`.
pub struct GvmClient {
    connection: GvmConnection,
    config: GvmConfig,
}

impl GvmClient {
    /// Connect the configured transport without authenticating yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be established.
    pub async fn connect(config: GvmConfig) -> Result<Self> {
        let connection = GvmConnection::connect(&config).await?;
        debug!("Transport to gvmd established");
        Ok(Self { connection, config })
    }

    /// Get access to the configuration.
    #[must_use]
    pub fn config(&self) -> &GvmConfig {
        &self.config
    }

    /// Authenticate the session with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`GvmError::Authentication`] when gvmd rejects the
    /// credentials, or a transport/protocol error otherwise.
    pub async fn authenticate(&mut self) -> Result<()> {
        let command = authenticate_command(&self.config.username, &self.config.password);
        match self.command(&command).await {
            Ok(_) => {
                info!("🔓 Authenticated with gvmd as '{}'", self.config.username);
                Ok(())
            }
            Err(GvmError::Command { status, status_text }) if status == "400" => {
                Err(GvmError::Authentication(if status_text.is_empty() {
                    "credentials rejected".to_string()
                } else {
                    status_text
                }))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch the GMP protocol version the server speaks.
    ///
    /// # Errors
    ///
    /// Returns an error on transport or protocol failure, or when the
    /// response carries no version element.
    pub async fn get_version(&mut self) -> Result<String> {
        let response = self.command("<get_version/>").await?;
        parse_version(&response)
    }

    /// Send a raw GMP command and return the response document after
    /// checking its status envelope.
    ///
    /// # Errors
    ///
    /// Returns [`GvmError::Command`] when the response status is not 2xx,
    /// or a transport error.
    pub async fn command(&mut self, command: &str) -> Result<String> {
        let response = self.connection.send_request(command).await?;
        let (status, status_text) = parse_envelope(&response)?;
        if !status.starts_with('2') {
            return Err(GvmError::Command {
                status,
                status_text,
            });
        }
        Ok(response)
    }
}

/// Build the GMP `authenticate` command, escaping the credential values.
fn authenticate_command(username: &str, password: &str) -> String {
    format!(
        "<authenticate><credentials><username>{}</username><password>{}</password></credentials></authenticate>",
        escape(username),
        escape(password),
    )
}

/// Read `status` and `status_text` from the response's root element.
///
/// Every GMP response root carries both attributes, whether the element has
/// content (`Start`) or is self-closing (`Empty`).
fn parse_envelope(xml: &str) -> Result<(String, String)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let mut status = None;
                let mut status_text = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"status" => status = Some(attr.unescape_value()?.to_string()),
                        b"status_text" => status_text = attr.unescape_value()?.to_string(),
                        _ => {}
                    }
                }
                return match status {
                    Some(status) => Ok((status, status_text)),
                    None => Err(GvmError::InvalidResponse(
                        "response root carries no status attribute".to_string(),
                    )),
                };
            }
            Ok(Event::Eof) => {
                return Err(GvmError::InvalidResponse(
                    "empty response document".to_string(),
                ));
            }
            Ok(_) => {}
            Err(e) => return Err(GvmError::Xml(e)),
        }
        buf.clear();
    }
}

fn parse_version(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut inside_version = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"version" => {
                inside_version = true;
            }
            Ok(Event::Text(ref text)) if inside_version => {
                return Ok(text.unescape()?.trim().to_string());
            }
            Ok(Event::Eof) => {
                return Err(GvmError::InvalidResponse(
                    "get_version response carried no version".to_string(),
                ));
            }
            Ok(_) => {}
            Err(e) => return Err(GvmError::Xml(e)),
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticate_command_escapes_credentials() {
        let command = authenticate_command("admin", r#"p<a>&s"s'w0rd"#);

        assert!(command.starts_with("<authenticate><credentials>"));
        assert!(command.contains("<username>admin</username>"));
        assert!(command.contains("p&lt;a&gt;&amp;s&quot;s&apos;w0rd"));
        assert!(!command.contains(r#"p<a>&s"s'w0rd"#));
    }

    #[test]
    fn test_parse_envelope_ok() {
        let (status, status_text) = parse_envelope(
            "<get_reports_response status=\"200\" status_text=\"OK\"></get_reports_response>",
        )
        .unwrap();
        assert_eq!(status, "200");
        assert_eq!(status_text, "OK");
    }

    #[test]
    fn test_parse_envelope_self_closing_root() {
        let (status, status_text) =
            parse_envelope("<authenticate_response status=\"400\" status_text=\"Authentication failed\"/>")
                .unwrap();
        assert_eq!(status, "400");
        assert_eq!(status_text, "Authentication failed");
    }

    #[test]
    fn test_parse_envelope_missing_status() {
        let err = parse_envelope("<response><thing/></response>").unwrap_err();
        assert!(matches!(err, GvmError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_envelope_empty_document() {
        let err = parse_envelope("").unwrap_err();
        assert!(matches!(err, GvmError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_version() {
        let version = parse_version(
            "<get_version_response status=\"200\" status_text=\"OK\"><version>22.5</version></get_version_response>",
        )
        .unwrap();
        assert_eq!(version, "22.5");
    }

    #[test]
    fn test_parse_version_missing_element() {
        let err =
            parse_version("<get_version_response status=\"200\"/>").unwrap_err();
        assert!(matches!(err, GvmError::InvalidResponse(_)));
    }
}
