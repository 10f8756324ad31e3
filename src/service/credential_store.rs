use crate::db::models::SavedCredential;
use crate::db::sqlite::SavedAccountsStorage;
use crate::error::LinkError;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, info, warn};

/// Messages handled by the credential store actor.
#[derive(Debug)]
pub enum CredentialStoreMessage {
    /// Create the backing table if absent.
    EnsureSchema(RpcReplyPort<Result<(), LinkError>>),
    /// Save (username, secret, device_id), replacing any account for that device.
    Save(String, String, String, RpcReplyPort<Result<(), LinkError>>),
    /// Whether an account is saved for the device.
    Exists(String, RpcReplyPort<Result<bool, LinkError>>),
    /// Fetch the account saved for the device.
    Fetch(String, RpcReplyPort<Result<SavedCredential, LinkError>>),
    /// Close the database and stop the actor.
    Close(RpcReplyPort<()>),
}

/// Handle to the saved-account store.
///
/// Every operation goes through one actor mailbox, so saves for the same
/// device are applied one at a time and the last one wins.
#[derive(Clone)]
pub struct CredentialStore {
    actor: ActorRef<CredentialStoreMessage>,
}

impl CredentialStore {
    /// Open the database at `database_url`, ensure the schema and spawn the actor.
    pub async fn open(database_url: &str) -> Result<Self, LinkError> {
        let storage = SavedAccountsStorage::connect(database_url).await?;
        storage.init_schema().await?;
        Self::from_storage(storage).await
    }

    /// Spawn the actor over an already connected storage.
    ///
    /// If the storage's pool is later closed by another holder, the next
    /// operation reopens it.
    pub async fn from_storage(storage: SavedAccountsStorage) -> Result<Self, LinkError> {
        let (actor, _jh) = Actor::spawn(None, CredentialStoreActor, storage)
            .await
            .map_err(|e| LinkError::RactorError(format!("failed to spawn store actor: {e}")))?;
        Ok(Self { actor })
    }

    pub async fn ensure_schema(&self) -> Result<(), LinkError> {
        ractor::call!(self.actor, CredentialStoreMessage::EnsureSchema)
            .map_err(|e| LinkError::RactorError(format!("EnsureSchema RPC failed: {e}")))?
    }

    pub async fn save(
        &self,
        username: impl Into<String>,
        secret: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Result<(), LinkError> {
        ractor::call!(
            self.actor,
            CredentialStoreMessage::Save,
            username.into(),
            secret.into(),
            device_id.into()
        )
        .map_err(|e| LinkError::RactorError(format!("Save RPC failed: {e}")))?
    }

    /// Storage failures are logged and reported as "no saved account".
    pub async fn exists(&self, device_id: impl AsRef<str>) -> bool {
        let device_id = device_id.as_ref();
        let res = ractor::call!(
            self.actor,
            CredentialStoreMessage::Exists,
            device_id.to_string()
        )
        .map_err(|e| LinkError::RactorError(format!("Exists RPC failed: {e}")))
        .and_then(|r| r);

        match res {
            Ok(found) => found,
            Err(e) => {
                warn!(device_id, error = %e, "saved account lookup failed; treating as absent");
                false
            }
        }
    }

    /// Fails with `NotFound` when nothing is saved for the device.
    pub async fn fetch(&self, device_id: impl AsRef<str>) -> Result<SavedCredential, LinkError> {
        ractor::call!(
            self.actor,
            CredentialStoreMessage::Fetch,
            device_id.as_ref().to_string()
        )
        .map_err(|e| LinkError::RactorError(format!("Fetch RPC failed: {e}")))?
    }

    /// Close the database and stop the actor.
    ///
    /// Closing is final: later calls fail with `RactorError` (or
    /// `StorageConnection` while the actor drains) and never reopen the pool.
    pub async fn close(&self) {
        if let Err(e) = ractor::call!(self.actor, CredentialStoreMessage::Close) {
            debug!(error = %e, "credential store already closed");
        }
    }
}

struct CredentialStoreState {
    storage: SavedAccountsStorage,
    closed: bool,
}

impl CredentialStoreState {
    /// Storage with a live pool.
    ///
    /// A pool closed outside the actor is reopened; one closed through
    /// `CredentialStore::close` stays shut.
    async fn storage(&mut self) -> Result<&SavedAccountsStorage, LinkError> {
        if self.closed {
            return Err(LinkError::StorageConnection(sqlx::Error::PoolClosed));
        }
        self.storage.ensure_open().await?;
        Ok(&self.storage)
    }
}

struct CredentialStoreActor;

#[ractor::async_trait]
impl Actor for CredentialStoreActor {
    type Msg = CredentialStoreMessage;
    type State = CredentialStoreState;
    type Arguments = SavedAccountsStorage;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        storage: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        debug!("CredentialStoreActor started");
        Ok(CredentialStoreState {
            storage,
            closed: false,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            CredentialStoreMessage::EnsureSchema(rp) => {
                let res = match state.storage().await {
                    Ok(storage) => storage.init_schema().await,
                    Err(e) => Err(e),
                };
                let _ = rp.send(res);
            }
            CredentialStoreMessage::Save(username, secret, device_id, rp) => {
                let res = self
                    .handle_save(state, &username, &secret, &device_id)
                    .await;
                let _ = rp.send(res);
            }
            CredentialStoreMessage::Exists(device_id, rp) => {
                let res = match state.storage().await {
                    Ok(storage) => storage.exists(&device_id).await,
                    Err(e) => Err(e),
                };
                let _ = rp.send(res);
            }
            CredentialStoreMessage::Fetch(device_id, rp) => {
                let res = self.handle_fetch(state, device_id).await;
                let _ = rp.send(res);
            }
            CredentialStoreMessage::Close(rp) => {
                state.closed = true;
                state.storage.close().await;
                info!("credential store closed");
                let _ = rp.send(());
                myself.stop(None);
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.storage.close().await;
        Ok(())
    }
}

impl CredentialStoreActor {
    async fn handle_save(
        &self,
        state: &mut CredentialStoreState,
        username: &str,
        secret: &str,
        device_id: &str,
    ) -> Result<(), LinkError> {
        let replaced = state
            .storage()
            .await?
            .upsert(username, secret, device_id)
            .await
            .inspect_err(|e| warn!(device_id, error = %e, "saving account failed"))?;

        if replaced {
            info!(device_id, "Account already exists with this device id, overwriting");
        }
        info!(device_id, username, "Saved account details");
        Ok(())
    }

    async fn handle_fetch(
        &self,
        state: &mut CredentialStoreState,
        device_id: String,
    ) -> Result<SavedCredential, LinkError> {
        let row = state
            .storage()
            .await?
            .get_by_device_id(&device_id)
            .await
            .inspect_err(|e| {
                warn!(device_id = %device_id, error = %e, "fetching saved account failed");
            })?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                debug!(device_id = %device_id, "no saved account");
                Err(LinkError::NotFound(device_id))
            }
        }
    }
}
