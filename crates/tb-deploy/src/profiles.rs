//! Client VPN profiles built from the fetched artifacts.
//!
//! Both renderers are pure: the same inputs always give the same bytes.
//! Payload UUIDs are derived from the deployment name, so re-rendering a
//! profile replaces the installed one instead of adding a second copy.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use uuid::Uuid;

const PROFILE_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_3c1e_9a4d_4f0a_8d2e_55c7_1e0b_93a4);

#[derive(Debug, thiserror::Error)]
pub enum ConfigRenderError {
    #[error("cannot render {profile} profile: {field} is empty")]
    MissingInput {
        profile: &'static str,
        field: &'static str,
    },

    #[error("cannot serialize {profile} profile: {source}")]
    Serialize {
        profile: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn require(profile: &'static str, field: &'static str, value: &[u8]) -> Result<(), ConfigRenderError> {
    if value.is_empty() {
        return Err(ConfigRenderError::MissingInput { profile, field });
    }
    Ok(())
}

fn payload_uuid(name: &str, payload: &str) -> String {
    Uuid::new_v5(&PROFILE_NAMESPACE, format!("{name}/{payload}").as_bytes())
        .hyphenated()
        .to_string()
        .to_uppercase()
}

// ── Apple (.mobileconfig) ────────────────────────────────────────────

/// Minimal property-list value tree.
enum Plist {
    Dict(Vec<(&'static str, Plist)>),
    Array(Vec<Plist>),
    String(String),
    Integer(i64),
    Bool(bool),
    Data(String),
}

impl Plist {
    fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    fn write(&self, out: &mut String, depth: usize) {
        let pad = "\t".repeat(depth);
        match self {
            Self::Dict(entries) => {
                out.push_str(&format!("{pad}<dict>\n"));
                for (key, value) in entries {
                    out.push_str(&format!("{pad}\t<key>{}</key>\n", escape_xml(key)));
                    value.write(out, depth + 1);
                }
                out.push_str(&format!("{pad}</dict>\n"));
            }
            Self::Array(items) => {
                out.push_str(&format!("{pad}<array>\n"));
                for item in items {
                    item.write(out, depth + 1);
                }
                out.push_str(&format!("{pad}</array>\n"));
            }
            Self::String(s) => out.push_str(&format!("{pad}<string>{}</string>\n", escape_xml(s))),
            Self::Integer(i) => out.push_str(&format!("{pad}<integer>{i}</integer>\n")),
            Self::Bool(true) => out.push_str(&format!("{pad}<true/>\n")),
            Self::Bool(false) => out.push_str(&format!("{pad}<false/>\n")),
            Self::Data(b64) => out.push_str(&format!("{pad}<data>{b64}</data>\n")),
        }
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn ike_parameters() -> Plist {
    Plist::Dict(vec![
        ("DiffieHellmanGroup", Plist::Integer(19)),
        ("EncryptionAlgorithm", Plist::string("AES-256-GCM")),
        ("IntegrityAlgorithm", Plist::string("SHA2-256")),
        ("LifeTimeInMinutes", Plist::Integer(1440)),
    ])
}

/// Render an Apple configuration profile with VPN, PKCS#12 and root CA
/// payloads.
pub fn render_apple_profile(
    server_address: &str,
    name: &str,
    passphrase: &str,
    private_key: &[u8],
    ca_cert: &[u8],
    server_cert: &[u8],
) -> Result<String, ConfigRenderError> {
    const PROFILE: &str = "apple";
    require(PROFILE, "server address", server_address.as_bytes())?;
    require(PROFILE, "deployment name", name.as_bytes())?;
    require(PROFILE, "client private key", private_key)?;
    require(PROFILE, "CA certificate", ca_cert)?;

    let profile_uuid = payload_uuid(name, "profile");
    let vpn_uuid = payload_uuid(name, "vpn");
    let p12_uuid = payload_uuid(name, "pkcs12");
    let ca_uuid = payload_uuid(name, "ca");

    let vpn = Plist::Dict(vec![
        (
            "IKEv2",
            Plist::Dict(vec![
                ("AuthenticationMethod", Plist::string("Certificate")),
                ("ChildSecurityAssociationParameters", ike_parameters()),
                ("DeadPeerDetectionRate", Plist::string("Medium")),
                ("DisableMOBIKE", Plist::Integer(0)),
                ("DisableRedirect", Plist::Integer(0)),
                ("EnableCertificateRevocationCheck", Plist::Integer(0)),
                ("EnablePFS", Plist::Bool(true)),
                ("IKESecurityAssociationParameters", ike_parameters()),
                ("LocalIdentifier", Plist::string(name)),
                ("OnDemandEnabled", Plist::Integer(1)),
                (
                    "OnDemandRules",
                    Plist::Array(vec![Plist::Dict(vec![("Action", Plist::string("Connect"))])]),
                ),
                ("PayloadCertificateUUID", Plist::string(p12_uuid.as_str())),
                ("RemoteAddress", Plist::string(server_address)),
                ("RemoteIdentifier", Plist::string(server_address)),
                ("UseConfigurationAttributeInternalIPSubnet", Plist::Integer(0)),
            ]),
        ),
        ("IPv4", Plist::Dict(vec![("OverridePrimary", Plist::Integer(1))])),
        ("PayloadDescription", Plist::string("Configures VPN settings")),
        ("PayloadDisplayName", Plist::string("VPN")),
        ("PayloadIdentifier", Plist::string(format!("com.apple.vpn.managed.{vpn_uuid}"))),
        ("PayloadType", Plist::string("com.apple.vpn.managed")),
        ("PayloadUUID", Plist::string(vpn_uuid.as_str())),
        ("PayloadVersion", Plist::Integer(1)),
        ("UserDefinedName", Plist::string(name)),
        ("VPNType", Plist::string("IKEv2")),
    ]);

    let pkcs12 = Plist::Dict(vec![
        ("Password", Plist::string(passphrase)),
        ("PayloadCertificateFileName", Plist::string(format!("{name}.client.cert.p12"))),
        ("PayloadContent", Plist::Data(STANDARD.encode(private_key))),
        ("PayloadDescription", Plist::string("Adds a PKCS#12-formatted certificate")),
        ("PayloadDisplayName", Plist::string(format!("{name}.client.cert.p12"))),
        ("PayloadIdentifier", Plist::string(format!("com.apple.security.pkcs12.{p12_uuid}"))),
        ("PayloadType", Plist::string("com.apple.security.pkcs12")),
        ("PayloadUUID", Plist::string(p12_uuid.as_str())),
        ("PayloadVersion", Plist::Integer(1)),
    ]);

    let root_ca = Plist::Dict(vec![
        ("PayloadCertificateFileName", Plist::string(format!("{name}.ca.cert.pem"))),
        ("PayloadContent", Plist::Data(STANDARD.encode(ca_cert))),
        ("PayloadDescription", Plist::string("Adds a CA root certificate")),
        ("PayloadDisplayName", Plist::string(format!("{name} CA"))),
        ("PayloadIdentifier", Plist::string(format!("com.apple.security.root.{ca_uuid}"))),
        ("PayloadType", Plist::string("com.apple.security.root")),
        ("PayloadUUID", Plist::string(ca_uuid.as_str())),
        ("PayloadVersion", Plist::Integer(1)),
    ]);

    let mut payloads = vec![vpn, pkcs12, root_ca];
    if !server_cert.is_empty() {
        let cert_uuid = payload_uuid(name, "server");
        payloads.push(Plist::Dict(vec![
            ("PayloadCertificateFileName", Plist::string(format!("{name}.server.cert.pem"))),
            ("PayloadContent", Plist::Data(STANDARD.encode(server_cert))),
            ("PayloadDescription", Plist::string("Adds the VPN server certificate")),
            ("PayloadDisplayName", Plist::string(format!("{name} server"))),
            ("PayloadIdentifier", Plist::string(format!("com.apple.security.pem.{cert_uuid}"))),
            ("PayloadType", Plist::string("com.apple.security.pem")),
            ("PayloadUUID", Plist::string(cert_uuid.as_str())),
            ("PayloadVersion", Plist::Integer(1)),
        ]));
    }

    let profile = Plist::Dict(vec![
        ("PayloadContent", Plist::Array(payloads)),
        ("PayloadDisplayName", Plist::string(name)),
        ("PayloadIdentifier", Plist::string(format!("tunnelbox.{name}"))),
        ("PayloadRemovalDisallowed", Plist::Bool(false)),
        ("PayloadType", Plist::string("Configuration")),
        ("PayloadUUID", Plist::string(profile_uuid.as_str())),
        ("PayloadVersion", Plist::Integer(1)),
    ]);

    let mut out = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" ",
        "\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
        "<plist version=\"1.0\">\n",
    ));
    profile.write(&mut out, 0);
    out.push_str("</plist>\n");
    Ok(out)
}

// ── Android (strongSwan .sswan) ──────────────────────────────────────

#[derive(Debug, Serialize)]
struct SswanProfile<'a> {
    uuid: String,
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    remote: SswanRemote<'a>,
    local: SswanLocal,
}

#[derive(Debug, Serialize)]
struct SswanRemote<'a> {
    addr: &'a str,
    cert: String,
}

#[derive(Debug, Serialize)]
struct SswanLocal {
    p12: String,
}

/// Render a strongSwan Android profile (JSON).
pub fn render_android_profile(
    server_address: &str,
    name: &str,
    private_key: &[u8],
    ca_cert: &[u8],
) -> Result<String, ConfigRenderError> {
    const PROFILE: &str = "android";
    require(PROFILE, "server address", server_address.as_bytes())?;
    require(PROFILE, "deployment name", name.as_bytes())?;
    require(PROFILE, "client private key", private_key)?;
    require(PROFILE, "CA certificate", ca_cert)?;

    let profile = SswanProfile {
        uuid: payload_uuid(name, "android").to_lowercase(),
        name,
        kind: "ikev2-cert",
        remote: SswanRemote {
            addr: server_address,
            cert: STANDARD.encode(ca_cert),
        },
        local: SswanLocal {
            p12: STANDARD.encode(private_key),
        },
    };

    serde_json::to_string_pretty(&profile).map_err(|source| ConfigRenderError::Serialize {
        profile: PROFILE,
        source,
    })
}
