//! Caller-managed transactions.
//!
//! Repositories expose `*_tx` variants that take `&mut SqliteConnection`; a
//! [`UnitOfWork`] hands out that connection so several repository calls can
//! share one transaction and the commit point stays visible at the call site.
//!
//! ```no_run
//! # use agora_database::{CommunityJoinRequestRepository, CommunityMemberRepository, CommunityMember, MemberRole, JoinRequestStatus};
//! # async fn approve(
//! #     requests: &CommunityJoinRequestRepository,
//! #     members: &CommunityMemberRepository,
//! #     request_id: uuid::Uuid,
//! # ) -> agora_database::DatabaseResult<()> {
//! let mut request = requests.find_by_id(request_id).await?.expect("request exists");
//! request.status = JoinRequestStatus::Approved;
//!
//! let mut uow = requests.begin_tx().await?;
//! requests.update_tx(uow.conn(), &mut request).await?;
//! let mut member = CommunityMember::new(request.community_id, request.user_id, MemberRole::Member);
//! members.add_tx(uow.conn(), &mut member).await?;
//! uow.commit().await?;
//! # Ok(())
//! # }
//! ```

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

use crate::types::{DatabaseError, DatabaseResult};

/// An open transaction. Dropping it without [`UnitOfWork::commit`] rolls back.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub async fn begin(pool: &SqlitePool) -> DatabaseResult<Self> {
        let tx = pool.begin().await?;
        debug!("transaction started");
        Ok(Self { tx })
    }

    /// Connection to pass into `*_tx` repository methods
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> DatabaseResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| DatabaseError::in_transaction("committing", e.into()))?;
        debug!("transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> DatabaseResult<()> {
        self.tx.rollback().await?;
        debug!("transaction rolled back");
        Ok(())
    }
}
