use async_trait::async_trait;
use futures::stream::StreamExt;
use log::debug;
use mongodb::bson::{self, doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, UpdateOptions};
use mongodb::{Collection, Database};

use super::{
    AdminRepository, CheckoutRepository, OrderListQuery, OrderPage, OrderRepository,
    RepositoryError, RepositoryResult, SettingsRepository,
};
use crate::db;
use crate::models::{AdminUser, Counter, EmailSettings, Order, OrderStatus, PendingCheckout};
use crate::pricing::PriceTable;

const DUPLICATE_KEY: i32 = 11000;
const PRICES_ID: &str = "prices";
const EMAIL_ID: &str = "email";

/// MongoDB-backed repositories sharing one database handle.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

/// Escapes regex metacharacters so search terms match literally.
fn escape_regex(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if "\\^$.|?*+()[]{}/-".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn order_filter(query: &OrderListQuery) -> Document {
    let mut filter = Document::new();
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    if let Some(term) = &query.search {
        let pattern = escape_regex(term);
        filter.insert(
            "$or",
            vec![
                doc! { "customer.fullName": { "$regex": pattern.as_str(), "$options": "i" } },
                doc! { "customer.vinNumber": { "$regex": pattern.as_str(), "$options": "i" } },
            ],
        );
    }
    filter
}

fn decode_order(mut document: Document) -> RepositoryResult<Order> {
    document.remove("_id");
    document.remove("seq");
    Ok(bson::from_document(document)?)
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn orders(&self) -> Collection<Document> {
        self.db.collection(db::ORDERS)
    }

    fn checkouts(&self) -> Collection<Document> {
        self.db.collection(db::CHECKOUTS)
    }

    fn settings(&self) -> Collection<Document> {
        self.db.collection(db::SETTINGS)
    }

    fn admins(&self) -> Collection<AdminUser> {
        self.db.collection(db::ADMINS)
    }

    fn counters(&self) -> Collection<Counter> {
        self.db.collection(db::COUNTERS)
    }

    async fn load_setting(&self, id: &str) -> RepositoryResult<Option<bson::Bson>> {
        let found = self.settings().find_one(doc! { "_id": id }, None).await?;
        Ok(found.and_then(|mut document| document.remove("value")))
    }

    async fn save_setting(&self, id: &str, value: bson::Bson) -> RepositoryResult<()> {
        let options = UpdateOptions::builder().upsert(true).build();
        self.settings()
            .update_one(doc! { "_id": id }, doc! { "$set": { "value": value } }, options)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MongoStore {
    async fn append(&self, order: &Order) -> RepositoryResult<()> {
        let seq = db::next_sequence(&self.counters(), db::ORDERS).await?;
        let mut document = bson::to_document(order)?;
        document.insert("_id", order.id.as_str());
        document.insert("seq", seq);

        match self.orders().insert_one(document, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(RepositoryError::Duplicate(order.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &str) -> RepositoryResult<Option<Order>> {
        match self.orders().find_one(doc! { "_id": id }, None).await? {
            Some(document) => Ok(Some(decode_order(document)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, query: &OrderListQuery) -> RepositoryResult<OrderPage> {
        let filter = order_filter(query);
        let total = self.orders().count_documents(filter.clone(), None).await?;

        let options = FindOptions::builder()
            .sort(doc! { "seq": -1 })
            .skip(query.offset() as u64)
            .limit(query.per_page as i64)
            .build();
        let mut cursor = self.orders().find(filter, options).await?;

        let mut orders = Vec::new();
        while let Some(result) = cursor.next().await {
            orders.push(decode_order(result?)?);
        }
        debug!("Listed {} of {} orders", orders.len(), total);
        Ok(OrderPage::new(orders, total as usize, query))
    }

    async fn update_status(&self, id: &str, status: OrderStatus) -> RepositoryResult<Order> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .orders()
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": { "status": status.as_str() } },
                options,
            )
            .await?;
        match updated {
            Some(document) => decode_order(document),
            None => Err(RepositoryError::NotFound(id.to_string())),
        }
    }

    async fn remove(&self, id: &str) -> RepositoryResult<()> {
        let result = self.orders().delete_one(doc! { "_id": id }, None).await?;
        if result.deleted_count == 1 {
            Ok(())
        } else {
            Err(RepositoryError::NotFound(id.to_string()))
        }
    }
}

#[async_trait]
impl CheckoutRepository for MongoStore {
    async fn save_pending(&self, checkout: &PendingCheckout) -> RepositoryResult<()> {
        let mut document = bson::to_document(checkout)?;
        document.insert("_id", checkout.gateway_order_id.as_str());
        let options = mongodb::options::ReplaceOptions::builder()
            .upsert(true)
            .build();
        self.checkouts()
            .replace_one(doc! { "_id": checkout.gateway_order_id.as_str() }, document, options)
            .await?;
        Ok(())
    }

    async fn get_pending(
        &self,
        gateway_order_id: &str,
    ) -> RepositoryResult<Option<PendingCheckout>> {
        match self
            .checkouts()
            .find_one(doc! { "_id": gateway_order_id }, None)
            .await?
        {
            Some(mut document) => {
                document.remove("_id");
                Ok(Some(bson::from_document(document)?))
            }
            None => Ok(None),
        }
    }

    async fn remove_pending(&self, gateway_order_id: &str) -> RepositoryResult<()> {
        self.checkouts()
            .delete_one(doc! { "_id": gateway_order_id }, None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsRepository for MongoStore {
    async fn load_prices(&self) -> RepositoryResult<Option<PriceTable>> {
        match self.load_setting(PRICES_ID).await? {
            Some(value) => Ok(Some(bson::from_bson(value)?)),
            None => Ok(None),
        }
    }

    async fn save_prices(&self, prices: &PriceTable) -> RepositoryResult<()> {
        self.save_setting(PRICES_ID, bson::to_bson(prices)?).await
    }

    async fn load_email_settings(&self) -> RepositoryResult<Option<EmailSettings>> {
        match self.load_setting(EMAIL_ID).await? {
            Some(value) => Ok(Some(bson::from_bson(value)?)),
            None => Ok(None),
        }
    }

    async fn save_email_settings(&self, settings: &EmailSettings) -> RepositoryResult<()> {
        self.save_setting(EMAIL_ID, bson::to_bson(settings)?).await
    }
}

#[async_trait]
impl AdminRepository for MongoStore {
    async fn find_admin_by_email(&self, email: &str) -> RepositoryResult<Option<AdminUser>> {
        let filter = doc! { "email": email.to_lowercase() };
        Ok(self.admins().find_one(filter, None).await?)
    }

    async fn create_admin(&self, admin: &AdminUser) -> RepositoryResult<()> {
        let mut admin = admin.clone();
        admin.email = admin.email.to_lowercase();
        match self.admins().insert_one(&admin, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(RepositoryError::Duplicate(admin.email)),
            Err(e) => Err(e.into()),
        }
    }

    async fn count_admins(&self) -> RepositoryResult<u64> {
        Ok(self.admins().count_documents(doc! {}, None).await?)
    }
}
