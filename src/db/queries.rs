pub const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS journeys (
    journey_id uuid PRIMARY KEY,
    device_id text NOT NULL,
    start_lat float8 NOT NULL,
    start_lng float8 NOT NULL,
    dest_lat float8 NOT NULL,
    dest_lng float8 NOT NULL,
    start_address text NULL,
    dest_address text NULL,
    expected_duration_minutes int4 NULL,
    start_time timestamptz NOT NULL,
    end_time timestamptz NULL,
    actual_duration_minutes int4 NULL,
    status text NOT NULL,
    has_deviation_alert bool NOT NULL DEFAULT false,
    has_stopped_alert bool NOT NULL DEFAULT false,
    alert_time timestamptz NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS journey_points (
    point_id bigserial PRIMARY KEY,
    journey_id uuid NOT NULL REFERENCES journeys (journey_id) ON DELETE CASCADE,
    lat float8 NOT NULL,
    lng float8 NOT NULL,
    accuracy float8 NOT NULL,
    speed float8 NULL,
    bearing float8 NULL,
    battery_level int2 NULL,
    timestamp timestamptz NOT NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS safe_zones (
    zone_id bigserial PRIMARY KEY,
    lat float8 NOT NULL,
    lng float8 NOT NULL,
    radius_meters float8 NOT NULL DEFAULT 100,
    name text NULL,
    address text NULL,
    safety_score int4 NOT NULL DEFAULT 50,
    incident_count int4 NOT NULL DEFAULT 0,
    last_incident_at timestamptz NULL,
    zone_class text NOT NULL,
    is_user_defined bool NOT NULL DEFAULT false,
    created_at timestamptz NOT NULL,
    updated_at timestamptz NOT NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS trusted_contacts (
    contact_id bigserial PRIMARY KEY,
    name text NOT NULL,
    phone_number text NOT NULL,
    relationship text NULL,
    priority int4 NOT NULL DEFAULT 1,
    receive_sms bool NOT NULL DEFAULT true,
    is_active bool NOT NULL DEFAULT true,
    last_notified_at timestamptz NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS emergency_events (
    event_id bigserial PRIMARY KEY,
    device_id text NOT NULL,
    timestamp timestamptz NOT NULL,
    lat float8 NOT NULL,
    lng float8 NOT NULL,
    accuracy float8 NULL,
    event_type text NOT NULL,
    status text NOT NULL,
    sms_sent bool NOT NULL DEFAULT false,
    sms_recipients text NULL,
    resolved_at timestamptz NULL
);
"#,
];

pub const INSERT_JOURNEY: &str = r#"
INSERT INTO journeys (
    journey_id, device_id, start_lat, start_lng, dest_lat, dest_lng,
    start_address, dest_address, expected_duration_minutes, start_time, status
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11);
"#;

pub const UPDATE_JOURNEY: &str = r#"
UPDATE journeys
SET end_time = $2,
    actual_duration_minutes = $3,
    status = $4,
    has_deviation_alert = $5,
    has_stopped_alert = $6,
    alert_time = $7
WHERE journey_id = $1;
"#;

pub const SELECT_JOURNEY: &str = r#"
SELECT * FROM journeys WHERE journey_id = $1;
"#;

pub const SELECT_ACTIVE_JOURNEY: &str = r#"
SELECT * FROM journeys
WHERE device_id = $1 AND status NOT IN ('completed', 'cancelled')
ORDER BY start_time DESC LIMIT 1;
"#;

pub const DELETE_FINISHED_JOURNEYS: &str = r#"
DELETE FROM journeys WHERE start_time < $1 AND status IN ('completed', 'cancelled');
"#;

pub const INSERT_JOURNEY_POINT: &str = r#"
INSERT INTO journey_points (journey_id, lat, lng, accuracy, speed, bearing, battery_level, timestamp)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
RETURNING point_id;
"#;

pub const SELECT_JOURNEY_POINTS: &str = r#"
SELECT * FROM journey_points WHERE journey_id = $1 ORDER BY timestamp ASC, point_id ASC;
"#;

// $3 > $4 means the box crosses the antimeridian.
pub const SELECT_ZONES_IN_BOUNDS: &str = r#"
SELECT * FROM safe_zones
WHERE lat BETWEEN $1 AND $2
  AND (($3 <= $4 AND lng BETWEEN $3 AND $4) OR ($3 > $4 AND (lng >= $3 OR lng <= $4)));
"#;

pub const INSERT_ZONE: &str = r#"
INSERT INTO safe_zones (
    lat, lng, radius_meters, name, address, safety_score, incident_count,
    last_incident_at, zone_class, is_user_defined, created_at, updated_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
RETURNING zone_id;
"#;

pub const UPDATE_ZONE: &str = r#"
UPDATE safe_zones
SET safety_score = $2,
    incident_count = $3,
    last_incident_at = $4,
    zone_class = $5,
    updated_at = $6
WHERE zone_id = $1;
"#;

pub const SELECT_ZONES_BELOW_SCORE: &str = r#"
SELECT * FROM safe_zones WHERE safety_score < $1 ORDER BY safety_score ASC;
"#;

pub const DELETE_OLD_CALCULATED_ZONES: &str = r#"
DELETE FROM safe_zones WHERE is_user_defined = false AND updated_at < $1;
"#;

pub const SELECT_SMS_CONTACTS: &str = r#"
SELECT * FROM trusted_contacts
WHERE receive_sms = true AND is_active = true
ORDER BY priority ASC, contact_id ASC;
"#;

pub const INSERT_CONTACT: &str = r#"
INSERT INTO trusted_contacts (name, phone_number, relationship, priority, receive_sms, is_active)
VALUES ($1, $2, $3, $4, $5, $6)
RETURNING contact_id;
"#;

pub const UPDATE_CONTACT_ACTIVE: &str = r#"
UPDATE trusted_contacts SET is_active = $2 WHERE contact_id = $1;
"#;

pub const UPDATE_CONTACTS_NOTIFIED: &str = r#"
UPDATE trusted_contacts SET last_notified_at = $2 WHERE contact_id = ANY($1);
"#;

pub const INSERT_EMERGENCY_EVENT: &str = r#"
INSERT INTO emergency_events (device_id, timestamp, lat, lng, accuracy, event_type, status)
VALUES ($1, $2, $3, $4, $5, $6, $7)
RETURNING event_id;
"#;

pub const SELECT_EMERGENCY_EVENT: &str = r#"
SELECT * FROM emergency_events WHERE event_id = $1;
"#;

pub const UPDATE_EMERGENCY_SMS_SENT: &str = r#"
UPDATE emergency_events SET sms_sent = true, sms_recipients = $2 WHERE event_id = $1;
"#;

pub const RESOLVE_EMERGENCY_EVENT: &str = r#"
UPDATE emergency_events SET status = 'resolved', resolved_at = $2
WHERE event_id = $1 AND status = 'active';
"#;

pub const DELETE_OLD_EMERGENCY_EVENTS: &str = r#"
DELETE FROM emergency_events WHERE timestamp < $1 AND status != 'active';
"#;
