//! Provider settings row

use sqlx::PgPool;

use crate::models::{Settings, UpdateSettingsRequest};

pub async fn get(pool: &PgPool) -> Result<Option<Settings>, sqlx::Error> {
    sqlx::query_as::<_, Settings>("SELECT * FROM settings ORDER BY id LIMIT 1")
        .fetch_optional(pool)
        .await
}

/// Upsert the single settings row. NULL request fields keep the stored
/// value, so partial updates never wipe other credentials.
pub async fn upsert(
    pool: &PgPool,
    req: &UpdateSettingsRequest,
) -> Result<Settings, sqlx::Error> {
    if let Some(existing) = get(pool).await? {
        sqlx::query_as::<_, Settings>(
            "UPDATE settings SET
                telephony_provider = COALESCE($2, telephony_provider),
                twilio_account_sid = COALESCE($3, twilio_account_sid),
                twilio_auth_token = COALESCE($4, twilio_auth_token),
                twilio_phone_number = COALESCE($5, twilio_phone_number),
                sipgate_token_id = COALESCE($6, sipgate_token_id),
                sipgate_token = COALESCE($7, sipgate_token),
                sipgate_phone_number = COALESCE($8, sipgate_phone_number),
                sipgate_device_id = COALESCE($9, sipgate_device_id),
                vonage_api_key = COALESCE($10, vonage_api_key),
                vonage_api_secret = COALESCE($11, vonage_api_secret),
                vonage_application_id = COALESCE($12, vonage_application_id),
                vonage_private_key = COALESCE($13, vonage_private_key),
                vonage_phone_number = COALESCE($14, vonage_phone_number),
                tts_provider = COALESCE($15, tts_provider),
                elevenlabs_api_key = COALESCE($16, elevenlabs_api_key),
                elevenlabs_voice_id = COALESCE($17, elevenlabs_voice_id),
                azure_speech_key = COALESCE($18, azure_speech_key),
                azure_speech_region = COALESCE($19, azure_speech_region),
                azure_voice_id = COALESCE($20, azure_voice_id),
                openai_api_key = COALESCE($21, openai_api_key),
                openai_model = COALESCE($22, openai_model),
                updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(existing.id)
        .bind(&req.telephony_provider)
        .bind(&req.twilio_account_sid)
        .bind(&req.twilio_auth_token)
        .bind(&req.twilio_phone_number)
        .bind(&req.sipgate_token_id)
        .bind(&req.sipgate_token)
        .bind(&req.sipgate_phone_number)
        .bind(&req.sipgate_device_id)
        .bind(&req.vonage_api_key)
        .bind(&req.vonage_api_secret)
        .bind(&req.vonage_application_id)
        .bind(&req.vonage_private_key)
        .bind(&req.vonage_phone_number)
        .bind(&req.tts_provider)
        .bind(&req.elevenlabs_api_key)
        .bind(&req.elevenlabs_voice_id)
        .bind(&req.azure_speech_key)
        .bind(&req.azure_speech_region)
        .bind(&req.azure_voice_id)
        .bind(&req.openai_api_key)
        .bind(&req.openai_model)
        .fetch_one(pool)
        .await
    } else {
        sqlx::query_as::<_, Settings>(
            "INSERT INTO settings (
                telephony_provider, twilio_account_sid, twilio_auth_token, twilio_phone_number,
                sipgate_token_id, sipgate_token, sipgate_phone_number, sipgate_device_id,
                vonage_api_key, vonage_api_secret, vonage_application_id, vonage_private_key,
                vonage_phone_number, tts_provider, elevenlabs_api_key, elevenlabs_voice_id,
                azure_speech_key, azure_speech_region, azure_voice_id, openai_api_key, openai_model
             ) VALUES (
                COALESCE($1, 'twilio'), $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                COALESCE($14, 'elevenlabs'), $15, $16, $17, $18, $19, $20, $21
             )
             RETURNING *",
        )
        .bind(&req.telephony_provider)
        .bind(&req.twilio_account_sid)
        .bind(&req.twilio_auth_token)
        .bind(&req.twilio_phone_number)
        .bind(&req.sipgate_token_id)
        .bind(&req.sipgate_token)
        .bind(&req.sipgate_phone_number)
        .bind(&req.sipgate_device_id)
        .bind(&req.vonage_api_key)
        .bind(&req.vonage_api_secret)
        .bind(&req.vonage_application_id)
        .bind(&req.vonage_private_key)
        .bind(&req.vonage_phone_number)
        .bind(&req.tts_provider)
        .bind(&req.elevenlabs_api_key)
        .bind(&req.elevenlabs_voice_id)
        .bind(&req.azure_speech_key)
        .bind(&req.azure_speech_region)
        .bind(&req.azure_voice_id)
        .bind(&req.openai_api_key)
        .bind(&req.openai_model)
        .fetch_one(pool)
        .await
    }
}
