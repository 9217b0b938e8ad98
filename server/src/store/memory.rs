use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    AccountStore, ApplicationStore, Rejection, StoreError, ADMIN_USERNAME_CONSTRAINT,
    OPEN_APPLICATION_CONSTRAINT, USER_EMAIL_CONSTRAINT,
};
use crate::models::{
    AdminUser, Application, ApplicationStatus, ApprovedPass, Holder, NewApplication, NewUser,
    PaymentStatus, ReviewEntry, User,
};

/// In-process store enforcing the same constraints as the Postgres schema.
/// Backs the test-suite and `serve --in-memory`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    admins: BTreeMap<i64, AdminUser>,
    applications: BTreeMap<i64, Application>,
    next_user_id: i64,
    next_admin_id: i64,
    next_application_id: i64,
}

impl Tables {
    fn holder(&self, user_id: i64) -> Result<Holder, StoreError> {
        self.users
            .get(&user_id)
            .map(Holder::from)
            .ok_or_else(|| StoreError::Query(format!("user {} missing", user_id)))
    }

    fn latest_matching<F>(&self, predicate: F) -> Option<&Application>
    where
        F: Fn(&Application) -> bool,
    {
        self.applications
            .values()
            .filter(|application| predicate(application))
            .max_by_key(|application| (application.application_date, application.id))
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Connection("memory store poisoned".to_string()))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<i64, StoreError> {
        let mut tables = self.tables()?;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation(USER_EMAIL_CONSTRAINT.to_string()));
        }

        tables.next_user_id += 1;
        let id = tables.next_user_id;
        tables.users.insert(
            id,
            User {
                id,
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                address: user.address,
                phone_number: user.phone_number,
                photo_path: user.photo_path,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_admin(&self, username: &str, password_hash: &str) -> Result<i64, StoreError> {
        let mut tables = self.tables()?;
        if tables.admins.values().any(|a| a.username == username) {
            return Err(StoreError::UniqueViolation(
                ADMIN_USERNAME_CONSTRAINT.to_string(),
            ));
        }

        tables.next_admin_id += 1;
        let id = tables.next_admin_id;
        tables.admins.insert(
            id,
            AdminUser {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn find_admin_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AdminUser>, StoreError> {
        Ok(self
            .tables()?
            .admins
            .values()
            .find(|a| a.username == username)
            .cloned())
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn insert_application(
        &self,
        application: NewApplication,
    ) -> Result<Application, StoreError> {
        let mut tables = self.tables()?;
        if !tables.users.contains_key(&application.user_id) {
            return Err(StoreError::Query(format!(
                "user {} does not exist",
                application.user_id
            )));
        }
        if tables
            .applications
            .values()
            .any(|a| a.user_id == application.user_id && a.is_open())
        {
            return Err(StoreError::UniqueViolation(
                OPEN_APPLICATION_CONSTRAINT.to_string(),
            ));
        }

        tables.next_application_id += 1;
        let id = tables.next_application_id;
        let stored = Application {
            id,
            user_id: application.user_id,
            start_point: application.start_point,
            end_point: application.end_point,
            amount: application.amount,
            status: ApplicationStatus::Pending,
            payment_status: PaymentStatus::Pending,
            application_date: Utc::now(),
            pass_number: None,
            qr_code_path: None,
        };
        tables.applications.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_application(&self, id: i64) -> Result<Option<Application>, StoreError> {
        Ok(self.tables()?.applications.get(&id).cloned())
    }

    async fn find_owned_application(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Application>, StoreError> {
        Ok(self
            .tables()?
            .applications
            .get(&id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn find_with_applicant(&self, id: i64) -> Result<Option<ReviewEntry>, StoreError> {
        let tables = self.tables()?;
        match tables.applications.get(&id) {
            Some(application) => Ok(Some(ReviewEntry {
                application: application.clone(),
                applicant: tables.holder(application.user_id)?,
            })),
            None => Ok(None),
        }
    }

    async fn latest_for_user(&self, user_id: i64) -> Result<Option<Application>, StoreError> {
        Ok(self
            .tables()?
            .latest_matching(|a| a.user_id == user_id)
            .cloned())
    }

    async fn latest_approved_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<ApprovedPass>, StoreError> {
        let tables = self.tables()?;
        let latest = tables
            .latest_matching(|a| a.user_id == user_id && a.status == ApplicationStatus::Approved)
            .cloned();
        match latest {
            Some(application) => Ok(Some(ApprovedPass {
                holder: tables.holder(application.user_id)?,
                application,
            })),
            None => Ok(None),
        }
    }

    async fn complete_payment(&self, id: i64, user_id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        match tables.applications.get_mut(&id) {
            Some(a)
                if a.user_id == user_id
                    && a.status == ApplicationStatus::Pending
                    && a.payment_status == PaymentStatus::Pending =>
            {
                a.payment_status = PaymentStatus::Completed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_approved(
        &self,
        id: i64,
        pass_number: &str,
        qr_code_path: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        match tables.applications.get_mut(&id) {
            Some(a)
                if a.status == ApplicationStatus::Pending
                    && a.payment_status == PaymentStatus::Completed =>
            {
                a.status = ApplicationStatus::Approved;
                a.pass_number = Some(pass_number.to_string());
                a.qr_code_path = Some(qr_code_path.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_rejected(&self, id: i64) -> Result<Option<Rejection>, StoreError> {
        let mut tables = self.tables()?;
        match tables.applications.get_mut(&id) {
            Some(a) if a.status != ApplicationStatus::Rejected => {
                a.status = ApplicationStatus::Rejected;
                a.pass_number = None;
                Ok(Some(Rejection {
                    cleared_qr_code_path: a.qr_code_path.take(),
                }))
            }
            _ => Ok(None),
        }
    }

    async fn paid_applications(&self) -> Result<Vec<ReviewEntry>, StoreError> {
        let tables = self.tables()?;
        let mut paid: Vec<&Application> = tables
            .applications
            .values()
            .filter(|a| a.payment_status == PaymentStatus::Completed)
            .collect();
        paid.sort_by_key(|a| (a.application_date, a.id));

        paid.into_iter()
            .map(|application| -> Result<ReviewEntry, StoreError> {
                Ok(ReviewEntry {
                    application: application.clone(),
                    applicant: tables.holder(application.user_id)?,
                })
            })
            .collect()
    }

    async fn count_awaiting_review(&self) -> Result<i64, StoreError> {
        let count = self
            .tables()?
            .applications
            .values()
            .filter(|a| {
                a.payment_status == PaymentStatus::Completed
                    && a.status == ApplicationStatus::Pending
            })
            .count();
        Ok(count as i64)
    }
}
