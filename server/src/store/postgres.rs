use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use super::{AccountStore, ApplicationStore, Rejection, StoreError};
use crate::models::{
    AdminUser, Application, ApplicationStatus, ApprovedPass, Holder, NewApplication, NewUser,
    PaymentStatus, ReviewEntry, User,
};

const APPLICATION_COLUMNS: &str = "a.id, a.user_id, a.start_point, a.end_point, a.amount, \
     a.status, a.payment_status, a.application_date, a.pass_number, a.qr_code_path";

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("migration failed: {}", e)))
    }
}

/// Application row joined with its owner's contact details.
#[derive(FromRow)]
struct ApplicantRow {
    id: i64,
    user_id: i64,
    start_point: String,
    end_point: String,
    amount: Decimal,
    status: ApplicationStatus,
    payment_status: PaymentStatus,
    application_date: DateTime<Utc>,
    pass_number: Option<String>,
    qr_code_path: Option<String>,
    holder_name: String,
    holder_email: String,
    holder_phone: String,
    holder_photo: Option<String>,
}

impl ApplicantRow {
    fn split(self) -> (Application, Holder) {
        let application = Application {
            id: self.id,
            user_id: self.user_id,
            start_point: self.start_point,
            end_point: self.end_point,
            amount: self.amount,
            status: self.status,
            payment_status: self.payment_status,
            application_date: self.application_date,
            pass_number: self.pass_number,
            qr_code_path: self.qr_code_path,
        };
        let holder = Holder {
            name: self.holder_name,
            email: self.holder_email,
            phone_number: self.holder_phone,
            photo_path: self.holder_photo,
        };
        (application, holder)
    }
}

impl From<ApplicantRow> for ReviewEntry {
    fn from(row: ApplicantRow) -> Self {
        let (application, applicant) = row.split();
        Self {
            application,
            applicant,
        }
    }
}

impl From<ApplicantRow> for ApprovedPass {
    fn from(row: ApplicantRow) -> Self {
        let (application, holder) = row.split();
        Self {
            application,
            holder,
        }
    }
}

fn applicant_select(filter: &str) -> String {
    format!(
        "SELECT {APPLICATION_COLUMNS}, u.name AS holder_name, u.email AS holder_email, \
         u.phone_number AS holder_phone, u.photo_path AS holder_photo \
         FROM applications a JOIN users u ON a.user_id = u.id {filter}"
    )
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (name, email, password_hash, address, phone_number, photo_path) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.address)
        .bind(&user.phone_number)
        .bind(&user.photo_path)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert_admin(&self, username: &str, password_hash: &str) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO admin_users (username, password_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_admin_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AdminUser>, StoreError> {
        let admin = sqlx::query_as::<_, AdminUser>(
            "SELECT id, username, password_hash, created_at FROM admin_users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }
}

#[async_trait]
impl ApplicationStore for PgStore {
    async fn insert_application(
        &self,
        application: NewApplication,
    ) -> Result<Application, StoreError> {
        let inserted = sqlx::query_as::<_, Application>(
            "INSERT INTO applications (user_id, start_point, end_point, amount, status, payment_status) \
             VALUES ($1, $2, $3, $4, 'PENDING', 'PENDING') \
             RETURNING id, user_id, start_point, end_point, amount, status, payment_status, \
             application_date, pass_number, qr_code_path",
        )
        .bind(application.user_id)
        .bind(&application.start_point)
        .bind(&application.end_point)
        .bind(application.amount)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn find_application(&self, id: i64) -> Result<Option<Application>, StoreError> {
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM applications a WHERE a.id = $1");
        let application = sqlx::query_as::<_, Application>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(application)
    }

    async fn find_owned_application(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Application>, StoreError> {
        let sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications a WHERE a.id = $1 AND a.user_id = $2"
        );
        let application = sqlx::query_as::<_, Application>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(application)
    }

    async fn find_with_applicant(&self, id: i64) -> Result<Option<ReviewEntry>, StoreError> {
        let sql = applicant_select("WHERE a.id = $1");
        let row = sqlx::query_as::<_, ApplicantRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ReviewEntry::from))
    }

    async fn latest_for_user(&self, user_id: i64) -> Result<Option<Application>, StoreError> {
        let sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications a WHERE a.user_id = $1 \
             ORDER BY a.application_date DESC, a.id DESC LIMIT 1"
        );
        let application = sqlx::query_as::<_, Application>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(application)
    }

    async fn latest_approved_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<ApprovedPass>, StoreError> {
        let sql = applicant_select(
            "WHERE a.user_id = $1 AND a.status = 'APPROVED' \
             ORDER BY a.application_date DESC, a.id DESC LIMIT 1",
        );
        let row = sqlx::query_as::<_, ApplicantRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ApprovedPass::from))
    }

    async fn complete_payment(&self, id: i64, user_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE applications SET payment_status = 'COMPLETED' \
             WHERE id = $1 AND user_id = $2 AND status = 'PENDING' AND payment_status = 'PENDING'",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_approved(
        &self,
        id: i64,
        pass_number: &str,
        qr_code_path: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE applications SET status = 'APPROVED', pass_number = $2, qr_code_path = $3 \
             WHERE id = $1 AND status = 'PENDING' AND payment_status = 'COMPLETED'",
        )
        .bind(id)
        .bind(pass_number)
        .bind(qr_code_path)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_rejected(&self, id: i64) -> Result<Option<Rejection>, StoreError> {
        // The locked CTE reads the row as it is when the update applies, so
        // the returned path is the one being cleared.
        let cleared = sqlx::query_scalar::<_, Option<String>>(
            "WITH prior AS ( \
                 SELECT id, qr_code_path FROM applications \
                 WHERE id = $1 AND status <> 'REJECTED' FOR UPDATE \
             ) \
             UPDATE applications a \
             SET status = 'REJECTED', pass_number = NULL, qr_code_path = NULL \
             FROM prior WHERE a.id = prior.id \
             RETURNING prior.qr_code_path",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cleared.map(|cleared_qr_code_path| Rejection { cleared_qr_code_path }))
    }

    async fn paid_applications(&self) -> Result<Vec<ReviewEntry>, StoreError> {
        let sql = applicant_select(
            "WHERE a.payment_status = 'COMPLETED' ORDER BY a.application_date ASC, a.id ASC",
        );
        let rows = sqlx::query_as::<_, ApplicantRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ReviewEntry::from).collect())
    }

    async fn count_awaiting_review(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(id) FROM applications \
             WHERE payment_status = 'COMPLETED' AND status = 'PENDING'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

// These run against a throwaway database created by `sqlx::test` from
// DATABASE_URL, with the embedded migrations applied.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PASS_AMOUNT;
    use crate::store::{ADMIN_USERNAME_CONSTRAINT, OPEN_APPLICATION_CONSTRAINT, USER_EMAIL_CONSTRAINT};

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Asha".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            address: Some("4th Cross".to_string()),
            phone_number: "555-1".to_string(),
            photo_path: Some("uploads/photos/a.png".to_string()),
        }
    }

    fn new_application(user_id: i64) -> NewApplication {
        NewApplication {
            user_id,
            start_point: "Majestic".to_string(),
            end_point: "Whitefield".to_string(),
            amount: PASS_AMOUNT,
        }
    }

    async fn set_application_date(pool: &PgPool, id: i64, at: &str) {
        sqlx::query("UPDATE applications SET application_date = $2::timestamptz WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(pool)
            .await
            .expect("date update");
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_unique_violations_carry_constraint_names(pool: PgPool) {
        let store = PgStore::new(pool);
        let user_id = store.insert_user(new_user("a@x.com")).await.expect("user");

        let err = store.insert_user(new_user("a@x.com")).await.unwrap_err();
        assert!(err.violates(USER_EMAIL_CONSTRAINT), "{err}");

        store.insert_admin("root", "$argon2id$stub").await.expect("admin");
        let err = store.insert_admin("root", "$argon2id$stub").await.unwrap_err();
        assert!(err.violates(ADMIN_USERNAME_CONSTRAINT), "{err}");

        let open = store
            .insert_application(new_application(user_id))
            .await
            .expect("first application");
        let err = store
            .insert_application(new_application(user_id))
            .await
            .unwrap_err();
        assert!(err.violates(OPEN_APPLICATION_CONSTRAINT), "{err}");

        assert!(store.mark_rejected(open.id).await.expect("reject").is_some());
        store
            .insert_application(new_application(user_id))
            .await
            .expect("slot freed by rejection");
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_guarded_updates_apply_once(pool: PgPool) {
        let store = PgStore::new(pool);
        let user_id = store.insert_user(new_user("a@x.com")).await.expect("user");
        let app = store
            .insert_application(new_application(user_id))
            .await
            .expect("application");
        assert_eq!(app.status, ApplicationStatus::Pending);
        assert_eq!(app.payment_status, PaymentStatus::Pending);
        assert_eq!(app.amount, PASS_AMOUNT);

        let qr = "uploads/qrcodes/BP-1-20250601.png";
        assert!(!store.mark_approved(app.id, "BP-1-20250601", qr).await.expect("unpaid"));
        assert!(!store.complete_payment(app.id, user_id + 1).await.expect("foreign"));
        assert!(store.complete_payment(app.id, user_id).await.expect("pay"));
        assert!(!store.complete_payment(app.id, user_id).await.expect("repay"));

        assert!(store.mark_approved(app.id, "BP-1-20250601", qr).await.expect("approve"));
        assert!(!store.mark_approved(app.id, "BP-1-20250602", "other.png").await.expect("again"));

        let approved = store
            .find_application(app.id)
            .await
            .expect("lookup")
            .expect("exists");
        assert_eq!(approved.status, ApplicationStatus::Approved);
        assert_eq!(approved.payment_status, PaymentStatus::Completed);
        assert_eq!(approved.pass_number.as_deref(), Some("BP-1-20250601"));

        let rejection = store.mark_rejected(app.id).await.expect("reject");
        assert_eq!(
            rejection,
            Some(Rejection {
                cleared_qr_code_path: Some(qr.to_string())
            })
        );
        assert_eq!(store.mark_rejected(app.id).await.expect("no-op"), None);
        assert_eq!(store.mark_rejected(9999).await.expect("missing"), None);

        let rejected = store
            .find_owned_application(app.id, user_id)
            .await
            .expect("lookup")
            .expect("owned");
        assert_eq!(rejected.status, ApplicationStatus::Rejected);
        assert_eq!(rejected.payment_status, PaymentStatus::Completed);
        assert!(rejected.pass_number.is_none() && rejected.qr_code_path.is_none());
        assert!(store
            .find_owned_application(app.id, user_id + 1)
            .await
            .expect("lookup")
            .is_none());
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_approved_rows_require_pass_fields(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let user_id = store.insert_user(new_user("a@x.com")).await.expect("user");
        let app = store
            .insert_application(new_application(user_id))
            .await
            .expect("application");

        let err = sqlx::query("UPDATE applications SET status = 'APPROVED' WHERE id = $1")
            .bind(app.id)
            .execute(&pool)
            .await
            .unwrap_err();
        match &err {
            sqlx::Error::Database(db) => {
                assert_eq!(db.constraint(), Some("applications_pass_fields_when_approved"))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(StoreError::from(err), StoreError::Query(_)));

        let err = sqlx::query("UPDATE applications SET status = 'ARCHIVED' WHERE id = $1")
            .bind(app.id)
            .execute(&pool)
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::Database(_)));
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_latest_orders_by_date_then_id(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let user_id = store.insert_user(new_user("a@x.com")).await.expect("user");

        let first = store
            .insert_application(new_application(user_id))
            .await
            .expect("first");
        store.mark_rejected(first.id).await.expect("reject");
        let second = store
            .insert_application(new_application(user_id))
            .await
            .expect("second");

        set_application_date(&pool, first.id, "2025-06-01T10:00:00Z").await;
        set_application_date(&pool, second.id, "2025-06-01T10:00:00Z").await;
        let latest = store.latest_for_user(user_id).await.expect("lookup").expect("some");
        assert_eq!(latest.id, second.id);

        set_application_date(&pool, first.id, "2025-06-02T10:00:00Z").await;
        let latest = store.latest_for_user(user_id).await.expect("lookup").expect("some");
        assert_eq!(latest.id, first.id);
        assert!(store.latest_for_user(user_id + 1).await.expect("lookup").is_none());
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn test_rows_decode_into_models(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let user_id = store.insert_user(new_user("a@x.com")).await.expect("user");

        let user = store.find_user(user_id).await.expect("lookup").expect("user");
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.address.as_deref(), Some("4th Cross"));
        let by_email = store
            .find_user_by_email("a@x.com")
            .await
            .expect("lookup")
            .expect("user");
        assert_eq!(by_email.id, user_id);

        store.insert_admin("root", "$argon2id$stub").await.expect("admin");
        let admin = store
            .find_admin_by_username("root")
            .await
            .expect("lookup")
            .expect("admin");
        assert_eq!(admin.username, "root");

        let older = store
            .insert_application(new_application(user_id))
            .await
            .expect("older");
        store.complete_payment(older.id, user_id).await.expect("pay");
        store
            .mark_approved(older.id, "BP-1-20250601", "uploads/qrcodes/BP-1-20250601.png")
            .await
            .expect("approve");
        let newer = store
            .insert_application(new_application(user_id))
            .await
            .expect("newer");
        store.complete_payment(newer.id, user_id).await.expect("pay");
        set_application_date(&pool, older.id, "2025-06-01T10:00:00Z").await;
        set_application_date(&pool, newer.id, "2025-06-03T10:00:00Z").await;

        let entry = store
            .find_with_applicant(newer.id)
            .await
            .expect("lookup")
            .expect("entry");
        assert_eq!(entry.applicant.name, "Asha");
        assert_eq!(entry.applicant.photo_path.as_deref(), Some("uploads/photos/a.png"));

        let queue = store.paid_applications().await.expect("queue");
        let ids: Vec<i64> = queue.iter().map(|e| e.application.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
        assert_eq!(store.count_awaiting_review().await.expect("count"), 1);

        let pass = store
            .latest_approved_for_user(user_id)
            .await
            .expect("lookup")
            .expect("approved");
        assert_eq!(pass.application.id, older.id);
        assert_eq!(pass.application.status, ApplicationStatus::Approved);
        assert_eq!(pass.holder.email, "a@x.com");
    }
}
