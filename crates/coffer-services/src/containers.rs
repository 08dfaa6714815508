//! Container helpers, one API value per container kind.

use coffer_core::{
    ContainerId, ContainerInfo, ContainerKind, ContainerPolicy, ContainerSpec, ContextId,
    ObjectInfo, PagingList, PagingQuery, Result, TransferError, UserWithPubKey,
};

use crate::connection::Connection;

/// Create, inspect, and list containers of a single kind.
#[derive(Clone)]
pub struct ContainerApi {
    conn: Connection,
    kind: ContainerKind,
}

impl ContainerApi {
    pub fn new(conn: Connection, kind: ContainerKind) -> Self {
        Self { conn, kind }
    }

    pub fn threads(conn: Connection) -> Self {
        Self::new(conn, ContainerKind::Thread)
    }

    pub fn stores(conn: Connection) -> Self {
        Self::new(conn, ContainerKind::Store)
    }

    pub fn inboxes(conn: Connection) -> Self {
        Self::new(conn, ContainerKind::Inbox)
    }

    pub fn kvdbs(conn: Connection) -> Self {
        Self::new(conn, ContainerKind::Kvdb)
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Create a container from its parts.
    pub fn create(
        &self,
        context_id: impl Into<ContextId>,
        users: Vec<UserWithPubKey>,
        managers: Vec<UserWithPubKey>,
        public_meta: &[u8],
        private_meta: &[u8],
        policy: Option<ContainerPolicy>,
    ) -> Result<ContainerId> {
        self.create_from(ContainerSpec {
            context_id: context_id.into(),
            users,
            managers,
            public_meta: public_meta.to_vec(),
            private_meta: private_meta.to_vec(),
            policy,
        })
    }

    pub fn create_from(&self, spec: ContainerSpec) -> Result<ContainerId> {
        self.conn
            .backend()
            .create_container(self.conn.user_id(), self.kind, spec)
    }

    /// Container metadata. A container of another kind reads as not found.
    pub fn info(&self, container: &ContainerId) -> Result<ContainerInfo> {
        let info = self
            .conn
            .backend()
            .container_info(self.conn.user_id(), container)?;
        if info.kind != self.kind {
            return Err(TransferError::not_found(format!(
                "{} {container}",
                self.kind.as_str()
            )));
        }
        Ok(info)
    }

    /// Finalized objects in `container`.
    pub fn list_objects(
        &self,
        container: &ContainerId,
        query: &PagingQuery,
    ) -> Result<PagingList<ObjectInfo>> {
        self.info(container)?;
        self.conn
            .backend()
            .list_objects(self.conn.user_id(), container, query)
    }
}

impl Connection {
    /// A container owned by this connection's user alone.
    fn owned(&self, context: ContextId) -> ContainerSpec {
        ContainerSpec::owned_by(context, self.user().clone())
    }

    pub fn create_thread(&self, context: impl Into<ContextId>) -> Result<ContainerId> {
        ContainerApi::threads(self.clone()).create_from(self.owned(context.into()))
    }

    pub fn create_store(&self, context: impl Into<ContextId>) -> Result<ContainerId> {
        ContainerApi::stores(self.clone()).create_from(self.owned(context.into()))
    }

    pub fn create_inbox(&self, context: impl Into<ContextId>) -> Result<ContainerId> {
        ContainerApi::inboxes(self.clone()).create_from(self.owned(context.into()))
    }

    pub fn create_kvdb(&self, context: impl Into<ContextId>) -> Result<ContainerId> {
        ContainerApi::kvdbs(self.clone()).create_from(self.owned(context.into()))
    }

    /// Finalized objects in any container the user can see.
    pub fn list_objects(
        &self,
        container: &ContainerId,
        query: &PagingQuery,
    ) -> Result<PagingList<ObjectInfo>> {
        self.backend().list_objects(self.user_id(), container, query)
    }
}
