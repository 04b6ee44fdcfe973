//! Certificate and SSL profile lifecycle for edge and reencrypt routes
//!
//! A TLS route owns up to seven appliance objects: the certificate, the key,
//! the destination CA chain, a client-ssl and a server-ssl profile, and the
//! attachment of both profiles to the HTTPS virtual server. They are created
//! in that order and removed in reverse.

use tracing::{debug, info, instrument, warn};

use crate::appliance::payloads::{
    ClientSslProfilePayload, InstallCommandPayload, ProfileContext, ServerSslProfilePayload,
    VirtualServerProfilePayload,
};
use crate::error::{Error, Result};

use super::ltm::{deleted_or_absent, Ltm};

/// Appliance object names derived from a route name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertNames {
    pub cert: String,
    pub key: String,
    pub chain: String,
    pub client_profile: String,
    pub server_profile: String,
}

impl CertNames {
    pub fn for_route(route: &str) -> Self {
        Self {
            cert: format!("{}-https-cert", route),
            key: format!("{}-https-key", route),
            chain: format!("{}-https-chain", route),
            client_profile: format!("{}-client-ssl-profile", route),
            server_profile: format!("{}-server-ssl-profile", route),
        }
    }
}

/// Which of a route's TLS objects to remove
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CertParts {
    server_profile_association: bool,
    server_profile: bool,
    client_profile_association: bool,
    client_profile: bool,
    key: bool,
    cert: bool,
    chain: bool,
}

impl CertParts {
    fn all() -> Self {
        Self {
            server_profile_association: true,
            server_profile: true,
            client_profile_association: true,
            client_profile: true,
            key: true,
            cert: true,
            chain: true,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum CryptoObject {
    Cert,
    Key,
}

impl CryptoObject {
    fn install_path(self) -> &'static str {
        match self {
            CryptoObject::Cert => "/sys/crypto/cert",
            CryptoObject::Key => "/sys/crypto/key",
        }
    }

    fn staging_extension(self) -> &'static str {
        match self {
            CryptoObject::Cert => "cert",
            CryptoObject::Key => "key",
        }
    }
}

impl Ltm {
    /// Install the certificate and key of `route`, create its client-ssl
    /// profile and attach it to the HTTPS virtual server. With a destination
    /// CA the chain and a server-ssl profile are added as well.
    ///
    /// On failure everything created so far is removed again.
    #[instrument(skip(self, cert, key, destination_ca))]
    pub async fn add_cert(
        &mut self,
        route: &str,
        hostname: &str,
        cert: &str,
        key: &str,
        destination_ca: Option<&str>,
    ) -> Result<()> {
        if self.transfer.is_none() {
            return Err(Error::TlsUnavailable(route.to_string()));
        }
        let Some(vserver) = self.https_vserver.clone() else {
            return Err(Error::ConfigError(format!(
                "cannot configure TLS for route {}: no HTTPS virtual server configured",
                route
            )));
        };

        let names = CertNames::for_route(route);
        let mut created = CertParts::default();

        let result = self
            .create_cert_parts(&names, &vserver, hostname, cert, key, destination_ca, &mut created)
            .await;

        if let Err(e) = result {
            if let Err(cleanup) = self.delete_cert_parts(&names, Some(&vserver), created).await {
                warn!(
                    "Configuring TLS for route {} failed and cleanup also failed: {}",
                    route, cleanup
                );
            }
            return Err(e);
        }

        info!("TLS configured for route {}", route);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_cert_parts(
        &self,
        names: &CertNames,
        vserver: &str,
        hostname: &str,
        cert: &str,
        key: &str,
        destination_ca: Option<&str>,
        created: &mut CertParts,
    ) -> Result<()> {
        self.install_file(CryptoObject::Cert, &names.cert, cert).await?;
        created.cert = true;

        self.install_file(CryptoObject::Key, &names.key, key).await?;
        created.key = true;

        // The profile must reference the installed objects with their
        // extensions or the appliance rejects the cert/key pair.
        let client_profile = ClientSslProfilePayload {
            cert: format!("{}.crt", names.cert),
            key: format!("{}.key", names.key),
            name: names.client_profile.clone(),
            server_name: hostname.to_string(),
        };
        self.client
            .post("/ltm/profile/client-ssl", &client_profile)
            .await?;
        created.client_profile = true;

        self.attach_profile(vserver, &names.client_profile, ProfileContext::Clientside)
            .await?;
        created.client_profile_association = true;

        let Some(destination_ca) = destination_ca else {
            return Ok(());
        };

        self.install_file(CryptoObject::Cert, &names.chain, destination_ca)
            .await?;
        created.chain = true;

        let server_profile = ServerSslProfilePayload {
            chain: format!("{}.crt", names.chain),
            name: names.server_profile.clone(),
            server_name: hostname.to_string(),
        };
        self.client
            .post("/ltm/profile/server-ssl", &server_profile)
            .await?;
        created.server_profile = true;

        self.attach_profile(vserver, &names.server_profile, ProfileContext::Serverside)
            .await?;
        created.server_profile_association = true;

        Ok(())
    }

    /// Remove every TLS object of `route`. Objects that do not exist are
    /// skipped.
    #[instrument(skip(self))]
    pub async fn delete_cert(&mut self, route: &str) -> Result<()> {
        let names = CertNames::for_route(route);
        let vserver = self.https_vserver.clone();
        self.delete_cert_parts(&names, vserver.as_deref(), CertParts::all())
            .await?;
        info!("TLS objects of route {} deleted", route);
        Ok(())
    }

    async fn delete_cert_parts(
        &self,
        names: &CertNames,
        vserver: Option<&str>,
        parts: CertParts,
    ) -> Result<()> {
        if let Some(vserver) = vserver {
            if parts.server_profile_association {
                self.detach_profile(vserver, &names.server_profile).await?;
            }
        }
        if parts.server_profile {
            self.delete_object(&format!("/ltm/profile/server-ssl/{}", names.server_profile))
                .await?;
        }
        if let Some(vserver) = vserver {
            if parts.client_profile_association {
                self.detach_profile(vserver, &names.client_profile).await?;
            }
        }
        if parts.client_profile {
            self.delete_object(&format!("/ltm/profile/client-ssl/{}", names.client_profile))
                .await?;
        }
        if parts.key {
            self.delete_object(&format!("/sys/file/ssl-key/{}.key", names.key))
                .await?;
        }
        if parts.cert {
            self.delete_object(&format!("/sys/file/ssl-cert/{}.crt", names.cert))
                .await?;
        }
        if parts.chain {
            self.delete_object(&format!("/sys/file/ssl-cert/{}.crt", names.chain))
                .await?;
        }
        Ok(())
    }

    async fn delete_object(&self, path: &str) -> Result<()> {
        if !deleted_or_absent(self.client.delete(path).await)? {
            debug!("{} was already absent", path);
        }
        Ok(())
    }

    async fn attach_profile(
        &self,
        vserver: &str,
        profile: &str,
        context: ProfileContext,
    ) -> Result<()> {
        let path = format!("/ltm/virtual/{}/profiles", self.client.resource_id(vserver));
        let payload = VirtualServerProfilePayload {
            name: profile.to_string(),
            context,
        };
        self.client.post(&path, &payload).await?;
        debug!("Attached profile {} to {}", profile, vserver);
        Ok(())
    }

    async fn detach_profile(&self, vserver: &str, profile: &str) -> Result<()> {
        self.delete_object(&format!(
            "/ltm/virtual/{}/profiles/{}",
            self.client.resource_id(vserver),
            profile
        ))
        .await
    }

    /// Stage `contents` on the appliance and install it as `name`. The
    /// staged file is removed whether or not the install succeeded.
    async fn install_file(&self, object: CryptoObject, name: &str, contents: &str) -> Result<()> {
        let transfer = self
            .transfer
            .as_ref()
            .ok_or_else(|| Error::TlsUnavailable(name.to_string()))?;
        let remote_path = format!("/var/tmp/{}.{}", name, object.staging_extension());

        let installed = match transfer.upload(contents.as_bytes(), &remote_path).await {
            Ok(()) => self
                .client
                .post(
                    object.install_path(),
                    &InstallCommandPayload::install(name, &remote_path),
                )
                .await
                .map_err(Error::from),
            Err(e) => Err(e),
        };

        if let Err(e) = transfer.remove(&remote_path).await {
            warn!("Could not remove staged file {}: {}", remote_path, e);
        }

        installed?;
        debug!("Installed {:?} {}", object, name);
        Ok(())
    }
}
