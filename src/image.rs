//! Image resolution: reuse an image by name or upload a new one.

use camino::Utf8Path;
use tracing::{debug, info};

use crate::descriptor::{ImageMetadata, VmConfig};
use crate::error::{LifecycleError, Stage, StageContext};
use crate::gateway::{ImageId, ImageStatus, ProviderGateway};
use crate::poll::{Poller, Readiness};

/// Finds or uploads the image an instance boots from.
#[derive(Debug)]
pub struct ImageResolver<'g, G: ?Sized> {
    gateway: &'g G,
    poller: Poller,
}

impl<'g, G> ImageResolver<'g, G>
where
    G: ProviderGateway + ?Sized,
{
    /// Creates a resolver that waits for uploads with `poller`.
    #[must_use]
    pub const fn new(gateway: &'g G, poller: Poller) -> Self {
        Self { gateway, poller }
    }

    /// Returns the explicit image identifier from `config`, otherwise the
    /// first image named like the metadata, otherwise a freshly uploaded
    /// image.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] when `config` names no image,
    /// and any search or upload failure.
    pub async fn resolve(&self, config: &VmConfig) -> Result<ImageId, LifecycleError> {
        if let Some(id) = &config.image_id {
            return Ok(id.clone());
        }
        let Some(metadata) = &config.image_metadata else {
            return Err(LifecycleError::Validation("image".to_owned()));
        };
        if let Some(id) = self.find_by_name(&metadata.name).await? {
            return Ok(id);
        }
        self.upload(metadata, config.image_path.as_deref()).await
    }

    /// Returns the first image whose name matches `name` exactly.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure tagged with [`Stage::FindImage`].
    pub async fn find_by_name(&self, name: &str) -> Result<Option<ImageId>, LifecycleError> {
        let matches = self
            .gateway
            .find_images_by_name(name)
            .await
            .at_stage(Stage::FindImage)?;
        debug!(image_name = name, matches = matches.len(), "image lookup");
        Ok(matches.into_iter().next())
    }

    /// Uploads the image at `path` and waits until it leaves the queue.
    ///
    /// A partially uploaded image is not deleted when the wait fails.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] when `path` is `None`, the
    /// upload failure, or the wait failure.
    pub async fn upload(
        &self,
        metadata: &ImageMetadata,
        path: Option<&Utf8Path>,
    ) -> Result<ImageId, LifecycleError> {
        let Some(image_path) = path else {
            return Err(LifecycleError::Validation("image_path".to_owned()));
        };
        info!(image_name = %metadata.name, path = %image_path, "uploading image");
        let id = self
            .gateway
            .upload_image(metadata, image_path)
            .await
            .at_stage(Stage::UploadImage)?;

        let gateway = self.gateway;
        let image = &id;
        self.poller
            .until(Stage::AwaitImage, id.as_str(), || async move {
                let status = gateway
                    .image_status(image)
                    .await
                    .at_stage(Stage::AwaitImage)?;
                Ok(match status {
                    ImageStatus::Queued | ImageStatus::Saving => Readiness::Pending,
                    ImageStatus::Killed | ImageStatus::Deleted => {
                        Readiness::Failed(status.to_string())
                    }
                    ImageStatus::Active | ImageStatus::Other(_) => Readiness::Ready(()),
                })
            })
            .await?;
        info!(image_id = %id, "image uploaded");
        Ok(id)
    }
}
