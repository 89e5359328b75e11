//! CalDAV implementation of [`CalendarStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use reqwest::{Client, Method, StatusCode, Url};
use tracing::{debug, error, info, warn};

use crate::config::CalDavConfig;
use crate::error::{EngineError, Result};
use crate::event::Event;
use crate::ical;
use crate::store::{CalendarStore, CreateOutcome};

/// CalDAV client speaking REPORT / PROPFIND / PUT / DELETE.
pub struct CalDavStore {
    client: Client,
    config: CalDavConfig,
    base_url: Url,
}

impl CalDavStore {
    pub fn new(config: CalDavConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .build()?;

        let mut base = config.server_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| EngineError::Config(format!("invalid CalDAV server URL {}: {}", base, e)))?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Build the client and check the server answers a collection listing.
    pub async fn connect(config: CalDavConfig) -> Result<Self> {
        let store = Self::new(config)?;
        let calendars = store.list_calendars().await?;
        info!(
            "CalDAV client connected to {} ({} calendars)",
            store.base_url,
            calendars.len()
        );
        Ok(store)
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| EngineError::Config(format!("invalid CalDAV path {}: {}", path, e)))
    }

    fn request(&self, method: &[u8], url: Url) -> Result<reqwest::RequestBuilder> {
        let method = Method::from_bytes(method)
            .map_err(|e| EngineError::Config(format!("invalid HTTP method: {}", e)))?;
        Ok(self
            .client
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password)))
    }

    /// Hrefs of the calendar collections under the server URL.
    pub async fn list_calendars(&self) -> Result<Vec<String>> {
        let body = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <D:prop>
        <D:displayname/>
        <D:resourcetype/>
    </D:prop>
</D:propfind>"#;

        let response = self
            .request(b"PROPFIND", self.base_url.clone())?
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Depth", "1")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EngineError::Fetch {
                calendar: self.base_url.to_string(),
                reason: format!("failed to list calendars: {}", response.status()),
            });
        }

        let text = response.text().await?;
        parse_calendar_hrefs(&text)
    }
}

#[async_trait]
impl CalendarStore for CalDavStore {
    async fn query_events(
        &self,
        calendar: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let url = self.url_for(calendar)?;
        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <D:prop>
        <D:getetag/>
        <C:calendar-data/>
    </D:prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">
                <C:time-range start="{}" end="{}"/>
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
            start.format("%Y%m%dT%H%M%SZ"),
            end.format("%Y%m%dT%H%M%SZ")
        );

        debug!("Querying calendar {}", url);

        let fetch_error = |reason: String| EngineError::Fetch {
            calendar: calendar.to_string(),
            reason,
        };

        let response = self
            .request(b"REPORT", url)?
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Depth", "1")
            .body(body)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(fetch_error(format!("{} - {}", status, text)));
        }

        let text = response.text().await.map_err(|e| fetch_error(e.to_string()))?;
        let events = parse_calendar_data(&text)?;
        debug!("Calendar {} returned {} events", calendar, events.len());
        Ok(events)
    }

    async fn resolve_calendar_path(&self) -> Result<Option<String>> {
        let calendars = self.list_calendars().await?;
        for path in &calendars {
            debug!("Found calendar: {}", path);
        }
        Ok(pick_calendar_path(&calendars))
    }

    async fn create_event(&self, path: &str, event: &Event) -> Result<CreateOutcome> {
        let url = self.url_for(path)?;
        let body = ical::render_event(event);

        debug!("Creating event at {}", url);

        let sent = self
            .request(b"PUT", url)?
            .header("Content-Type", "text/calendar; charset=utf-8")
            .header("If-None-Match", "*")
            .body(body)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!("No response while creating {}: {}", path, e);
                return Ok(CreateOutcome::Unconfirmed);
            }
            Err(e) => {
                error!("Error creating CalDAV event {}: {}", path, e);
                return Err(EngineError::RemoteMutation(e.to_string()));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("Create event failed: {} - {}", status, text);
            return Err(EngineError::RemoteMutation(format!(
                "failed to create event: {} - {}",
                status, text
            )));
        }

        Ok(CreateOutcome::Confirmed)
    }

    async fn delete_event(&self, path: &str) -> Result<()> {
        let url = self.url_for(path)?;
        debug!("Deleting event at {}", url);

        let response = self
            .request(b"DELETE", url)?
            .send()
            .await
            .map_err(|e| EngineError::RemoteMutation(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!("Event {} was already gone", path);
            return Ok(());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Delete event failed: {} - {}", status, text);
            return Err(EngineError::RemoteMutation(format!(
                "failed to delete event: {} - {}",
                status, text
            )));
        }
        Ok(())
    }
}

/// Choose the collection bookings go to: one whose path mentions `default`,
/// else the first.
pub fn pick_calendar_path(paths: &[String]) -> Option<String> {
    paths
        .iter()
        .find(|p| p.contains("default"))
        .or_else(|| paths.first())
        .cloned()
}

/// Events from every `calendar-data` element of a REPORT multistatus.
pub fn parse_calendar_data(xml: &str) -> Result<Vec<Event>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut in_data = false;
    let mut data = String::new();
    let mut events = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(ref e)) if e.local_name().as_ref() == b"calendar-data" => {
                in_data = true;
                data.clear();
            }
            Ok(XmlEvent::End(ref e)) if e.local_name().as_ref() == b"calendar-data" => {
                in_data = false;
                events.extend(ical::parse_calendar(&data));
            }
            Ok(XmlEvent::Text(ref e)) if in_data => {
                let text = e
                    .unescape()
                    .map_err(|err| EngineError::Xml(err.to_string()))?;
                data.push_str(&text);
            }
            Ok(XmlEvent::CData(ref e)) if in_data => {
                data.push_str(&String::from_utf8_lossy(e));
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(EngineError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(events)
}

/// Hrefs of `response` elements whose resourcetype includes `calendar`.
pub fn parse_calendar_hrefs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut in_href = false;
    let mut href = String::new();
    let mut is_calendar = false;
    let mut calendars = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(ref e)) => match e.local_name().as_ref() {
                b"response" => {
                    href.clear();
                    is_calendar = false;
                }
                b"href" => in_href = true,
                b"calendar" => is_calendar = true,
                _ => {}
            },
            Ok(XmlEvent::Empty(ref e)) if e.local_name().as_ref() == b"calendar" => {
                is_calendar = true;
            }
            Ok(XmlEvent::End(ref e)) => match e.local_name().as_ref() {
                b"href" => in_href = false,
                b"response" if is_calendar && !href.trim().is_empty() => {
                    calendars.push(href.trim().to_string());
                }
                _ => {}
            },
            Ok(XmlEvent::Text(ref e)) if in_href => {
                let text = e
                    .unescape()
                    .map_err(|err| EngineError::Xml(err.to_string()))?;
                href.push_str(&text);
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(EngineError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(calendars)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/dav/calendars/alice/default/standup.ics</d:href>
    <d:propstat>
      <d:prop>
        <d:getetag>"1"</d:getetag>
        <cal:calendar-data>BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:standup
DTSTART:20240603T090000Z
DTEND:20240603T093000Z
RRULE:FREQ=DAILY;COUNT=5
SUMMARY:Standup &amp; sync
END:VEVENT
END:VCALENDAR
</cal:calendar-data>
      </d:prop>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/calendars/alice/default/review.ics</d:href>
    <d:propstat>
      <d:prop>
        <cal:calendar-data><![CDATA[BEGIN:VCALENDAR
BEGIN:VEVENT
UID:review
DTSTART:20240604T140000Z
END:VEVENT
END:VCALENDAR
]]></cal:calendar-data>
      </d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    const PROPFIND: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/dav/calendars/alice/</d:href>
    <d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/calendars/alice/work/</d:href>
    <d:propstat><d:prop><d:resourcetype><d:collection/><cal:calendar/></d:resourcetype></d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/calendars/alice/default/</d:href>
    <d:propstat><d:prop><d:resourcetype><d:collection/><cal:calendar/></d:resourcetype></d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn report_yields_events_from_text_and_cdata() {
        let events = parse_calendar_data(REPORT).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].uid, "standup");
        assert!(events[0].is_recurring());
        assert_eq!(events[0].summary(), Some("Standup & sync"));
        assert_eq!(events[1].uid, "review");
        assert_eq!(events[1].duration(), chrono::Duration::hours(1));
    }

    #[test]
    fn propfind_lists_only_calendar_collections() {
        let hrefs = parse_calendar_hrefs(PROPFIND).unwrap();
        assert_eq!(
            hrefs,
            vec![
                "/dav/calendars/alice/work/".to_string(),
                "/dav/calendars/alice/default/".to_string()
            ]
        );
        assert_eq!(
            pick_calendar_path(&hrefs),
            Some("/dav/calendars/alice/default/".to_string())
        );
    }

    #[test]
    fn pick_falls_back_to_first_collection() {
        let paths = vec!["/a/".to_string(), "/b/".to_string()];
        assert_eq!(pick_calendar_path(&paths), Some("/a/".to_string()));
        assert_eq!(pick_calendar_path(&[]), None);
    }

    #[test]
    fn relative_and_absolute_paths_join_onto_server() {
        let store = CalDavStore::new(CalDavConfig {
            server_url: "https://dav.example.com/remote/dav".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            store.url_for("calendars/alice/").unwrap().as_str(),
            "https://dav.example.com/remote/dav/calendars/alice/"
        );
        assert_eq!(
            store.url_for("/other/cal/").unwrap().as_str(),
            "https://dav.example.com/other/cal/"
        );
    }
}
