//! Contact cache of one user.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::merge::merge_contacts;
use super::model::{AddressBook, GroupContact, LocalContact, MergedContact, NewContact};
use super::repository::{CommitOutcome, ContactRepository};
use super::search::{Collector, Comparator, Matcher};
use super::source::DeviceContactSource;
use crate::Result;
use crate::account::UserId;
use crate::api::ApiFetcher;
use crate::config::{CoreConfig, ExecutionContext};

/// Slot holding the cancellation token of the running merge.
type MergeSlot = Mutex<Option<CancellationToken>>;

/// Clears the merge slot when the merge ends, however it ends.
struct RunningMerge<'a> {
    slot: &'a MergeSlot,
    cancel: CancellationToken,
}

impl<'a> RunningMerge<'a> {
    fn start(slot: &'a MergeSlot) -> Option<Self> {
        let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            return None;
        }
        let cancel = CancellationToken::new();
        *current = Some(cancel.clone());
        Some(Self { slot, cancel })
    }
}

impl Drop for RunningMerge<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Keeps one user's merged contacts, address books and groups.
///
/// Contacts from the remote directory and from the device are reconciled
/// into [`MergedContact`] rows in a store file named after the user.
pub struct ContactManager {
    user_id: UserId,
    repository: ContactRepository,
    api_fetcher: Arc<ApiFetcher>,
    device_contacts: Arc<dyn DeviceContactSource>,
    context: ExecutionContext,
    refresh_interval: Duration,
    search_limit: usize,
    merge: MergeSlot,
    last_refresh: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for ContactManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactManager")
            .field("user_id", &self.user_id)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl ContactManager {
    /// Create the contact manager of `api_fetcher`'s user.
    ///
    /// The store is opened on first use.
    #[must_use]
    pub fn new(
        config: &CoreConfig,
        api_fetcher: Arc<ApiFetcher>,
        device_contacts: Arc<dyn DeviceContactSource>,
    ) -> Self {
        let user_id = api_fetcher.user_id();
        Self {
            user_id,
            repository: ContactRepository::new(config.store_location(), user_id),
            api_fetcher,
            device_contacts,
            context: config.context,
            refresh_interval: config.contacts_refresh_interval(),
            search_limit: config.search_limit,
            merge: Mutex::new(None),
            last_refresh: Mutex::new(None),
        }
    }

    /// Owner of the contacts.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns true while a merge is running.
    #[must_use]
    pub fn is_merging(&self) -> bool {
        self.merge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Reconciles the remote directory with the device contacts.
    ///
    /// Skipped outside the main app, and a no-op while another merge runs.
    /// The merge is computed first and committed in one transaction; if
    /// [`cancel_contact_merge`](Self::cancel_contact_merge) is called before
    /// the commit, nothing is deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote contacts cannot be fetched, the device
    /// contacts cannot be read, or the store fails.
    pub async fn update_contact_db(&self) -> Result<()> {
        if !self.context.allows_contact_merge() {
            debug!(user_id = %self.user_id, "Contact merge skipped in {:?}", self.context);
            return Ok(());
        }
        let Some(merge) = RunningMerge::start(&self.merge) else {
            info!(user_id = %self.user_id, "Contact merge already running");
            return Ok(());
        };

        let remote_contacts = self
            .api_fetcher
            .perform(|api, token| async move { api.contacts(&token).await })
            .await?;
        if merge.cancel.is_cancelled() {
            info!(user_id = %self.user_id, "Contact merge cancelled");
            return Ok(());
        }

        let device = Arc::clone(&self.device_contacts);
        let cancel = merge.cancel.clone();
        let merged = tokio::task::spawn_blocking(move || {
            merge_contacts(remote_contacts, device.as_ref(), &cancel)
        })
        .await??;
        let Some(merged) = merged else {
            info!(user_id = %self.user_id, "Contact merge cancelled");
            return Ok(());
        };

        match self
            .repository
            .replace_merged_contacts(&merged, &merge.cancel)
            .await?
        {
            CommitOutcome::Committed { upserted, deleted } => {
                info!(user_id = %self.user_id, upserted, deleted, "Contacts merged");
            }
            CommitOutcome::Cancelled => {
                info!(user_id = %self.user_id, "Contact merge cancelled before commit");
            }
        }
        Ok(())
    }

    /// Cancels the running merge, if any.
    pub fn cancel_contact_merge(&self) {
        if let Some(cancel) = self
            .merge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            debug!(user_id = %self.user_id, "Cancelling contact merge");
            cancel.cancel();
        }
    }

    /// Fetches and stores the address books with their groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch or the store fails.
    pub async fn refresh_address_books(&self) -> Result<()> {
        let books = self
            .api_fetcher
            .perform(|api, token| async move { api.address_books(&token).await })
            .await?;
        self.repository.replace_address_books(&books).await?;
        debug!(user_id = %self.user_id, "Stored {} address book(s)", books.len());
        Ok(())
    }

    /// Refreshes address books, then merges contacts.
    ///
    /// The merge runs even if the address books fail; that error is returned
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns the address book error first, otherwise the merge error.
    pub async fn refresh_contacts_and_address_books(&self) -> Result<()> {
        let books = self.refresh_address_books().await;
        if let Err(e) = &books {
            warn!(user_id = %self.user_id, "Address book refresh failed: {e}");
        }
        let merged = self.update_contact_db().await;

        if books.is_ok() && merged.is_ok() {
            *self
                .last_refresh
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        }
        books?;
        merged
    }

    /// Like [`refresh_contacts_and_address_books`](Self::refresh_contacts_and_address_books),
    /// unless the last successful refresh is more recent than the refresh interval.
    ///
    /// Returns whether a refresh ran.
    ///
    /// # Errors
    ///
    /// Returns the refresh error.
    pub async fn refresh_contacts_and_address_books_if_needed(&self) -> Result<bool> {
        let last = *self
            .last_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last.is_some_and(|at| at.elapsed() < self.refresh_interval) {
            debug!(user_id = %self.user_id, "Contacts refreshed recently");
            return Ok(false);
        }
        self.refresh_contacts_and_address_books().await?;
        Ok(true)
    }

    /// All merged contacts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn merged_contacts(&self) -> Result<Vec<MergedContact>> {
        self.repository.merged_contacts().await
    }

    /// Merged contacts whose name or email contains `query`, ignoring case and accents.
    ///
    /// `limit` defaults to the configured search limit. `comparator`, if
    /// given, orders the matches before the limit applies.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn search_contacts(
        &self,
        query: &str,
        limit: Option<usize>,
        comparator: Option<Comparator<'_, MergedContact>>,
    ) -> Result<Vec<MergedContact>> {
        self.repository
            .search_merged_contacts(query, limit.unwrap_or(self.search_limit), comparator)
            .await
    }

    /// Groups whose name contains `query`, ignoring case and accents.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn search_group_contacts(
        &self,
        query: &str,
        limit: Option<usize>,
        comparator: Option<Comparator<'_, GroupContact>>,
    ) -> Result<Vec<GroupContact>> {
        let matcher = Matcher::new(query);
        let mut collector = Collector::new(limit.unwrap_or(self.search_limit), comparator);
        for group in self.repository.group_contacts().await? {
            if matcher.matches([group.name.as_str()]) && !collector.push(group) {
                break;
            }
        }
        Ok(collector.finish())
    }

    /// Device contacts whose name or one of whose emails contains `query`.
    ///
    /// Enumeration stops once enough matches are found, unless a comparator
    /// needs all of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the device contacts cannot be read.
    pub async fn search_device_contacts(
        &self,
        query: &str,
        limit: Option<usize>,
        comparator: Option<Comparator<'_, LocalContact>>,
    ) -> Result<Vec<LocalContact>> {
        let limit = limit.unwrap_or(self.search_limit);
        let cap = if comparator.is_some() { usize::MAX } else { limit };
        let matcher = Matcher::new(query);
        let device = Arc::clone(&self.device_contacts);

        let found = tokio::task::spawn_blocking(move || -> Result<Vec<LocalContact>> {
            let mut found = Vec::new();
            device.enumerate_contacts(&mut |contact, stop| {
                let name = contact.full_name();
                let fields = std::iter::once(name.as_str()).chain(contact.emails.iter().map(String::as_str));
                if matcher.matches(fields) {
                    found.push(contact);
                }
                *stop = found.len() >= cap;
            })?;
            Ok(found)
        })
        .await??;

        let mut collector = Collector::new(limit, comparator);
        for contact in found {
            if !collector.push(contact) {
                break;
            }
        }
        Ok(collector.finish())
    }

    /// Merged contacts reachable through `email`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn contacts_with_email(&self, email: &str) -> Result<Vec<MergedContact>> {
        self.repository.contacts_with_email(email).await
    }

    /// Stored address books, default first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn address_books(&self) -> Result<Vec<AddressBook>> {
        self.repository.address_books().await
    }

    /// The address book new contacts go to: the one marked default, else the first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn default_address_book(&self) -> Result<Option<AddressBook>> {
        let mut books = self.repository.address_books().await?;
        let index = books.iter().position(|book| book.is_default).unwrap_or(0);
        Ok((index < books.len()).then(|| books.swap_remove(index)))
    }

    /// Creates `contact` remotely in `address_book`, then merges again.
    ///
    /// # Errors
    ///
    /// Returns an error if the creation or the merge fails.
    pub async fn add_contact(&self, contact: &NewContact, address_book: &AddressBook) -> Result<()> {
        let book_id = address_book.id;
        let id = self
            .api_fetcher
            .perform(|api, token| {
                let contact = contact.clone();
                async move { api.add_contact(&token, &contact, book_id).await }
            })
            .await?;
        info!(user_id = %self.user_id, contact_id = %id, "Contact added");
        self.update_contact_db().await
    }

    /// Cancels any merge and closes the store.
    pub async fn close(&self) {
        self.cancel_contact_merge();
        self.repository.close().await;
    }
}
